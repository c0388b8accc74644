//! # 层原语
//!
//! 每个层提供一对函数：`*_forward` 返回 `(输出, 缓存)`，`*_backward` 按值
//! 消费对应缓存并返回对输入与各参数的精确解析梯度。缓存类型对每种层独立，
//! 因此"K 层前向的缓存只会进入 K 层反向"由类型系统保证。

mod affine;
mod batch_norm;
mod conv2d;
mod dropout;
mod layer_norm;
mod max_pool2d;
mod relu;
mod spatial_norm;

pub use affine::{AffineCache, affine_backward, affine_forward};
pub use batch_norm::{
    BatchNormCache, BatchNormState, batch_norm_backward, batch_norm_backward_alt,
    batch_norm_forward,
};
pub use conv2d::{Conv2dCache, conv2d_backward, conv2d_forward};
pub use dropout::{DropoutCache, dropout_backward, dropout_forward};
pub use layer_norm::{LayerNormCache, layer_norm_backward, layer_norm_forward};
pub use max_pool2d::{MaxPool2dCache, max_pool2d_backward, max_pool2d_forward};
pub use relu::{ReluCache, relu_backward, relu_forward};
pub use spatial_norm::{
    GroupNormCache, group_norm_backward, group_norm_forward, spatial_batch_norm_backward,
    spatial_batch_norm_forward,
};
