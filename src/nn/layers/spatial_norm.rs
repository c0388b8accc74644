use ndarray::{s, Array1, Array2, Array4};

use crate::errors::NetError;
use crate::nn::Mode;
use crate::utils::traits::float::Dtype;

use super::batch_norm::{
    batch_norm_backward, batch_norm_forward, BatchNormCache, BatchNormState,
};

/// 把 `(N, C, H, W)` 重排成 `(N*H*W, C)`：每个空间位置视作一个样本，
/// 逐通道统计就退化成普通批归一化的逐特征统计。
fn to_channel_rows<F: Dtype>(x: &Array4<F>) -> Array2<F> {
    let (n, c, h, w) = x.dim();
    let values: Vec<F> = x
        .view()
        .permuted_axes([0, 2, 3, 1])
        .iter()
        .copied()
        .collect();
    Array2::from_shape_vec((n * h * w, c), values).expect("通道重排形状与元素数不符")
}

/// [`to_channel_rows`] 的逆变换。
fn from_channel_rows<F: Dtype>(rows: Array2<F>, n: usize, c: usize, h: usize, w: usize) -> Array4<F> {
    let nhwc = rows
        .into_shape((n, h, w, c))
        .expect("通道重排无法还原空间形状");
    let values: Vec<F> = nhwc.view().permuted_axes([0, 3, 1, 2]).iter().copied().collect();
    Array4::from_shape_vec((n, c, h, w), values).expect("通道重排无法还原空间形状")
}

/// 空间批归一化前向传播：对 `(N, C, H, W)` 输入逐通道归一化。
///
/// 实现上复用普通批归一化：把空间位置并入批量维后委托给
/// [`batch_norm_forward`]，运行统计量语义完全一致。
///
/// # 返回
/// `(out, cache)`，测试模式下 `cache` 为 `None`
pub fn spatial_batch_norm_forward<F: Dtype>(
    x: &Array4<F>,
    gamma: &Array1<F>,
    beta: &Array1<F>,
    state: &mut BatchNormState<F>,
    mode: Mode,
) -> (Array4<F>, Option<BatchNormCache<F>>) {
    let (n, c, h, w) = x.dim();
    let rows = to_channel_rows(x);
    let (out_rows, cache) = batch_norm_forward(&rows, gamma, beta, state, mode);
    (from_channel_rows(out_rows, n, c, h, w), cache)
}

/// 空间批归一化的反向传播，同样通过重排委托给 [`batch_norm_backward`]。
///
/// # 返回
/// `(dx, dgamma, dbeta)`
pub fn spatial_batch_norm_backward<F: Dtype>(
    dout: &Array4<F>,
    cache: BatchNormCache<F>,
) -> (Array4<F>, Array1<F>, Array1<F>) {
    let (n, c, h, w) = dout.dim();
    let dout_rows = to_channel_rows(dout);
    let (dx_rows, dgamma, dbeta) = batch_norm_backward(&dout_rows, cache);
    (from_channel_rows(dx_rows, n, c, h, w), dgamma, dbeta)
}

/// 组归一化前向传播保留的中间量。
#[derive(Debug)]
pub struct GroupNormCache<F: Dtype> {
    x: Array4<F>,
    x_norm: Array4<F>,
    mean: Array2<F>,
    var: Array2<F>,
    gamma: Array1<F>,
    groups: usize,
    eps: F,
}

/// 组归一化前向传播：把通道分成 `groups` 组，统计量按
/// `(样本, 组)` 粒度在组内通道与全部空间位置上计算，与批量大小无关。
///
/// # 参数
/// - `x`: 输入，形状 `(N, C, H, W)`，要求 `C % groups == 0`
/// - `gamma` / `beta`: 逐通道缩放与平移，形状 `(C,)`
/// - `groups`: 分组数，须大于零
/// - `eps`: 数值稳定项
///
/// # 返回
/// `(out, cache)`
pub fn group_norm_forward<F: Dtype>(
    x: &Array4<F>,
    gamma: &Array1<F>,
    beta: &Array1<F>,
    groups: usize,
    eps: F,
) -> Result<(Array4<F>, GroupNormCache<F>), NetError> {
    let (n, c, h, w) = x.dim();
    if groups == 0 || c % groups != 0 {
        return Err(NetError::InvalidConfig(format!(
            "通道数 {c} 必须能被分组数 {groups} 整除"
        )));
    }
    let cg = c / groups;
    let m = F::from_count(cg * h * w);

    let mut mean = Array2::<F>::zeros((n, groups));
    let mut var = Array2::<F>::zeros((n, groups));
    let mut x_norm = Array4::<F>::zeros((n, c, h, w));
    for ni in 0..n {
        for g in 0..groups {
            let slab = x.slice(s![ni, g * cg..(g + 1) * cg, .., ..]);
            let mu = slab.iter().copied().sum::<F>() / m;
            let vr = slab.iter().map(|&v| (v - mu) * (v - mu)).sum::<F>() / m;
            mean[[ni, g]] = mu;
            var[[ni, g]] = vr;
            let inv_std = F::one() / (vr + eps).sqrt();
            let mut norm_slab = x_norm.slice_mut(s![ni, g * cg..(g + 1) * cg, .., ..]);
            norm_slab.assign(&slab.mapv(|v| (v - mu) * inv_std));
        }
    }

    let mut out = Array4::<F>::zeros((n, c, h, w));
    for ci in 0..c {
        let scaled = x_norm
            .slice(s![.., ci, .., ..])
            .mapv(|v| v * gamma[ci] + beta[ci]);
        out.slice_mut(s![.., ci, .., ..]).assign(&scaled);
    }

    let cache = GroupNormCache {
        x: x.clone(),
        x_norm,
        mean,
        var,
        gamma: gamma.clone(),
        groups,
        eps,
    };
    Ok((out, cache))
}

/// 组归一化的反向传播，链式法则与批归一化同构，统计粒度换成
/// `(样本, 组)`。
///
/// # 返回
/// `(dx, dgamma, dbeta)`
pub fn group_norm_backward<F: Dtype>(
    dout: &Array4<F>,
    cache: GroupNormCache<F>,
) -> Result<(Array4<F>, Array1<F>, Array1<F>), NetError> {
    let GroupNormCache {
        x,
        x_norm,
        mean,
        var,
        gamma,
        groups,
        eps,
    } = cache;
    let (n, c, h, w) = x.dim();
    if dout.dim() != (n, c, h, w) {
        return Err(NetError::ShapeMismatch {
            expected: vec![n, c, h, w],
            got: dout.shape().to_vec(),
            message: "上游梯度的形状与缓存不符".to_string(),
        });
    }
    let cg = c / groups;
    let m = F::from_count(cg * h * w);
    let half = F::from_f64c(0.5);
    let two = F::from_f64c(2.0);

    let mut dgamma = Array1::<F>::zeros(c);
    let mut dbeta = Array1::<F>::zeros(c);
    for ci in 0..c {
        let d_slab = dout.slice(s![.., ci, .., ..]);
        let n_slab = x_norm.slice(s![.., ci, .., ..]);
        dgamma[ci] = d_slab.iter().zip(n_slab.iter()).map(|(&d, &v)| d * v).sum();
        dbeta[ci] = d_slab.iter().copied().sum();
    }

    let mut dx = Array4::<F>::zeros((n, c, h, w));
    for ni in 0..n {
        for g in 0..groups {
            let mu = mean[[ni, g]];
            let inv_std = F::one() / (var[[ni, g]] + eps).sqrt();

            let mut dvar = F::zero();
            let mut dmean_a = F::zero();
            let mut sum_c = F::zero();
            for ci in g * cg..(g + 1) * cg {
                for hi in 0..h {
                    for wi in 0..w {
                        let dxn = dout[[ni, ci, hi, wi]] * gamma[ci];
                        let cen = x[[ni, ci, hi, wi]] - mu;
                        dvar += dxn * cen * (-half) * inv_std * inv_std * inv_std;
                        dmean_a += -dxn * inv_std;
                        sum_c += cen;
                    }
                }
            }
            let dmean = dmean_a + dvar * (-two) * sum_c / m;

            for ci in g * cg..(g + 1) * cg {
                for hi in 0..h {
                    for wi in 0..w {
                        let dxn = dout[[ni, ci, hi, wi]] * gamma[ci];
                        let cen = x[[ni, ci, hi, wi]] - mu;
                        dx[[ni, ci, hi, wi]] =
                            dxn * inv_std + dvar * two * cen / m + dmean / m;
                    }
                }
            }
        }
    }
    Ok((dx, dgamma, dbeta))
}
