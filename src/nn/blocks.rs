//! # 复合块
//!
//! 把常用的层序列（仿射后接归一化与 ReLU）封装成一次前向 / 一次反向，
//! 全连接网络的隐藏层直接由这些块搭成。

use ndarray::{Array1, Array2, ArrayD, Ix2};

use crate::errors::NetError;
use crate::nn::Mode;
use crate::utils::traits::float::Dtype;

use super::layers::{
    affine_backward, affine_forward, batch_norm_backward, batch_norm_forward, layer_norm_backward,
    layer_norm_forward, relu_backward, relu_forward, AffineCache, BatchNormCache, BatchNormState,
    LayerNormCache, ReluCache,
};

/// 仿射-ReLU 块的缓存。
pub struct AffineReluCache<F: Dtype> {
    affine: AffineCache<F>,
    relu: ReluCache<F, Ix2>,
}

/// 仿射后接 ReLU 的前向传播。
pub fn affine_relu_forward<F: Dtype>(
    x: &ArrayD<F>,
    w: &Array2<F>,
    b: &Array1<F>,
) -> (Array2<F>, AffineReluCache<F>) {
    let (a, affine) = affine_forward(x, w, b);
    let (out, relu) = relu_forward(&a);
    (out, AffineReluCache { affine, relu })
}

/// 仿射-ReLU 块的反向传播。
///
/// # 返回
/// `(dx, dw, db)`
pub fn affine_relu_backward<F: Dtype>(
    dout: &Array2<F>,
    cache: AffineReluCache<F>,
) -> (ArrayD<F>, Array2<F>, Array1<F>) {
    let da = relu_backward(dout, cache.relu);
    affine_backward(&da, cache.affine)
}

/// 夹在仿射与 ReLU 之间的归一化层选择。
///
/// 批归一化需要可变借用持久状态并区分训练 / 测试；层归一化无状态，
/// 只带数值稳定项。
pub enum NormLayer<'a, F: Dtype> {
    Batch {
        state: &'a mut BatchNormState<F>,
        mode: Mode,
    },
    Layer {
        eps: F,
    },
}

/// 归一化层前向传播产生的缓存。
pub enum NormCache<F: Dtype> {
    Batch(BatchNormCache<F>),
    Layer(LayerNormCache<F>),
}

/// 仿射-归一化-ReLU 块的缓存。批归一化在测试模式下不产生归一化缓存。
pub struct AffineNormReluCache<F: Dtype> {
    affine: AffineCache<F>,
    norm: Option<NormCache<F>>,
    relu: ReluCache<F, Ix2>,
}

/// 仿射后接归一化、再接 ReLU 的前向传播。
pub fn affine_norm_relu_forward<F: Dtype>(
    x: &ArrayD<F>,
    w: &Array2<F>,
    b: &Array1<F>,
    gamma: &Array1<F>,
    beta: &Array1<F>,
    norm: NormLayer<'_, F>,
) -> (Array2<F>, AffineNormReluCache<F>) {
    let (a, affine) = affine_forward(x, w, b);
    let (normed, norm_cache) = match norm {
        NormLayer::Batch { state, mode } => {
            let (out, cache) = batch_norm_forward(&a, gamma, beta, state, mode);
            (out, cache.map(NormCache::Batch))
        }
        NormLayer::Layer { eps } => {
            let (out, cache) = layer_norm_forward(&a, gamma, beta, eps);
            (out, Some(NormCache::Layer(cache)))
        }
    };
    let (out, relu) = relu_forward(&normed);
    (
        out,
        AffineNormReluCache {
            affine,
            norm: norm_cache,
            relu,
        },
    )
}

/// 仿射-归一化-ReLU 块的反向传播。
///
/// 测试模式的前向不产生归一化缓存，对其调用反向传播会返回
/// [`NetError::ComputationError`]。
///
/// # 返回
/// `(dx, dw, db, dgamma, dbeta)`
pub fn affine_norm_relu_backward<F: Dtype>(
    dout: &Array2<F>,
    cache: AffineNormReluCache<F>,
) -> Result<(ArrayD<F>, Array2<F>, Array1<F>, Array1<F>, Array1<F>), NetError> {
    let dn = relu_backward(dout, cache.relu);
    let norm = cache.norm.ok_or_else(|| {
        NetError::ComputationError("评估模式的前向没有归一化缓存，无法反向传播".to_string())
    })?;
    let (da, dgamma, dbeta) = match norm {
        NormCache::Batch(bn) => batch_norm_backward(&dn, bn),
        NormCache::Layer(ln) => layer_norm_backward(&dn, ln),
    };
    let (dx, dw, db) = affine_backward(&da, cache.affine);
    Ok((dx, dw, db, dgamma, dbeta))
}
