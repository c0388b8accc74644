use ndarray::{Array1, Array2, Axis};

use crate::nn::Mode;
use crate::utils::traits::float::Dtype;

/// 批归一化的持久状态：跨批次维护的运行统计量与超参数。
///
/// 运行统计量在训练模式下按指数滑动平均更新，测试模式下只读。
#[derive(Debug, Clone)]
pub struct BatchNormState<F: Dtype> {
    pub running_mean: Array1<F>,
    pub running_var: Array1<F>,
    pub eps: F,
    pub momentum: F,
}

impl<F: Dtype> BatchNormState<F> {
    /// 创建 `dim` 维特征的初始状态：运行均值为零、运行方差为零，
    /// `eps = 1e-5`，`momentum = 0.9`。
    pub fn new(dim: usize) -> Self {
        Self {
            running_mean: Array1::zeros(dim),
            running_var: Array1::zeros(dim),
            eps: F::from_f64c(1e-5),
            momentum: F::from_f64c(0.9),
        }
    }
}

/// 批归一化训练模式前向传播保留的中间量。
pub struct BatchNormCache<F: Dtype> {
    x: Array2<F>,
    x_norm: Array2<F>,
    mean: Array1<F>,
    var: Array1<F>,
    gamma: Array1<F>,
    eps: F,
}

/// 批归一化前向传播。
///
/// 训练模式按当前小批量统计量归一化并更新运行统计量
/// （`running = momentum * running + (1 - momentum) * 当前统计量`）；
/// 测试模式按运行统计量归一化，不产生缓存。
///
/// # 参数
/// - `x`: 输入，形状 `(N, D)`
/// - `gamma` / `beta`: 逐特征缩放与平移，形状 `(D,)`
/// - `state`: 持久状态，训练模式下会被更新
/// - `mode`: 训练或测试
///
/// # 返回
/// `(out, cache)`，测试模式下 `cache` 为 `None`
pub fn batch_norm_forward<F: Dtype>(
    x: &Array2<F>,
    gamma: &Array1<F>,
    beta: &Array1<F>,
    state: &mut BatchNormState<F>,
    mode: Mode,
) -> (Array2<F>, Option<BatchNormCache<F>>) {
    match mode {
        Mode::Train => {
            let mean = x.mean_axis(Axis(0)).expect("批量不能为空");
            let var = x.var_axis(Axis(0), F::zero());
            let std = var.mapv(|v| (v + state.eps).sqrt());
            let x_norm = (x - &mean) / &std;
            let out = &x_norm * gamma + beta;
            let m = state.momentum;
            state.running_mean = &state.running_mean * m + &mean * (F::one() - m);
            state.running_var = &state.running_var * m + &var * (F::one() - m);
            let cache = BatchNormCache {
                x: x.clone(),
                x_norm,
                mean,
                var,
                gamma: gamma.clone(),
                eps: state.eps,
            };
            (out, Some(cache))
        }
        Mode::Test => {
            let std = state.running_var.mapv(|v| (v + state.eps).sqrt());
            let x_norm = (x - &state.running_mean) / &std;
            let out = &x_norm * gamma + beta;
            (out, None)
        }
    }
}

/// 批归一化反向传播（直接对计算图逐步求导）。
///
/// # 返回
/// `(dx, dgamma, dbeta)`
pub fn batch_norm_backward<F: Dtype>(
    dout: &Array2<F>,
    cache: BatchNormCache<F>,
) -> (Array2<F>, Array1<F>, Array1<F>) {
    let BatchNormCache {
        x,
        x_norm,
        mean,
        var,
        gamma,
        eps,
    } = cache;
    let n = F::from_count(x.nrows());
    let half = F::from_f64c(0.5);
    let two = F::from_f64c(2.0);

    let dgamma = (dout * &x_norm).sum_axis(Axis(0));
    let dbeta = dout.sum_axis(Axis(0));

    let std = var.mapv(|v| (v + eps).sqrt());
    let centered = &x - &mean;
    let dx_norm = dout * &gamma;
    let dvar = (&dx_norm * &centered).sum_axis(Axis(0)) * &std.mapv(|s| -half / (s * s * s));
    let dmean = (&dx_norm / &std).sum_axis(Axis(0)).mapv(|v| -v)
        + &dvar
            * &centered
                .mean_axis(Axis(0))
                .expect("批量不能为空")
                .mapv(|v| -two * v);
    let dx = &dx_norm / &std + &centered * &dvar.mapv(|v| two * v / n) + &dmean.mapv(|v| v / n);
    (dx, dgamma, dbeta)
}

/// 批归一化反向传播的化简形式：先在纸上把链式法则整体展开，
/// 再按单一表达式实现。与 [`batch_norm_backward`] 结果应在数值噪声内一致。
pub fn batch_norm_backward_alt<F: Dtype>(
    dout: &Array2<F>,
    cache: BatchNormCache<F>,
) -> (Array2<F>, Array1<F>, Array1<F>) {
    let BatchNormCache {
        x_norm, var, gamma, eps, ..
    } = cache;
    let n = F::from_count(dout.nrows());

    let dgamma = (dout * &x_norm).sum_axis(Axis(0));
    let dbeta = dout.sum_axis(Axis(0));

    let std = var.mapv(|v| (v + eps).sqrt());
    // dx = gamma / (N * std) * (N * dout - dbeta - x_norm * dgamma)
    let coeff = &gamma / &std.mapv(|s| s * n);
    let dx = (&(dout * n) - &dbeta - &(&x_norm * &dgamma)) * &coeff;
    (dx, dgamma, dbeta)
}
