use ndarray::{Array1, Array2, Axis};

use crate::utils::traits::float::Dtype;

/// 层归一化前向传播保留的中间量。
pub struct LayerNormCache<F: Dtype> {
    x: Array2<F>,
    x_norm: Array2<F>,
    mean: Array1<F>,
    var: Array1<F>,
    gamma: Array1<F>,
    eps: F,
}

/// 层归一化前向传播：对每个样本自身的特征维做归一化。
///
/// 统计量逐样本计算，与批内其它样本无关，因此训练与测试行为一致，
/// 也不需要运行统计量。
///
/// # 参数
/// - `x`: 输入，形状 `(N, D)`
/// - `gamma` / `beta`: 逐特征缩放与平移，形状 `(D,)`
/// - `eps`: 数值稳定项
///
/// # 返回
/// `(out, cache)`
pub fn layer_norm_forward<F: Dtype>(
    x: &Array2<F>,
    gamma: &Array1<F>,
    beta: &Array1<F>,
    eps: F,
) -> (Array2<F>, LayerNormCache<F>) {
    let mean = x.mean_axis(Axis(1)).expect("特征维不能为空");
    let var = x.var_axis(Axis(1), F::zero());
    let std_col = var.mapv(|v| (v + eps).sqrt()).insert_axis(Axis(1));
    let mean_col = mean.clone().insert_axis(Axis(1));
    let x_norm = (x - &mean_col) / &std_col;
    let out = &x_norm * gamma + beta;
    let cache = LayerNormCache {
        x: x.clone(),
        x_norm,
        mean,
        var,
        gamma: gamma.clone(),
        eps,
    };
    (out, cache)
}

/// 层归一化反向传播，与批归一化同构，只是统计轴换成特征维。
///
/// # 返回
/// `(dx, dgamma, dbeta)`
pub fn layer_norm_backward<F: Dtype>(
    dout: &Array2<F>,
    cache: LayerNormCache<F>,
) -> (Array2<F>, Array1<F>, Array1<F>) {
    let LayerNormCache {
        x,
        x_norm,
        mean,
        var,
        gamma,
        eps,
    } = cache;
    let d = F::from_count(x.ncols());
    let half = F::from_f64c(0.5);
    let two = F::from_f64c(2.0);

    let dgamma = (dout * &x_norm).sum_axis(Axis(0));
    let dbeta = dout.sum_axis(Axis(0));

    let std = var.mapv(|v| (v + eps).sqrt());
    let std_col = std.clone().insert_axis(Axis(1));
    let mean_col = mean.insert_axis(Axis(1));
    let centered = &x - &mean_col;
    let dx_norm = dout * &gamma;
    let dvar = (&dx_norm * &centered).sum_axis(Axis(1)) * &std.mapv(|s| -half / (s * s * s));
    let dmean = (&dx_norm / &std_col).sum_axis(Axis(1)).mapv(|v| -v)
        + &dvar
            * &centered
                .mean_axis(Axis(1))
                .expect("特征维不能为空")
                .mapv(|v| -two * v);
    let dvar_col = dvar.mapv(|v| two * v / d).insert_axis(Axis(1));
    let dmean_col = dmean.mapv(|v| v / d).insert_axis(Axis(1));
    let dx = &dx_norm / &std_col + &centered * &dvar_col + &dmean_col;
    (dx, dgamma, dbeta)
}
