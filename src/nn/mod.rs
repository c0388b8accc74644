//! # 神经网络模块
//!
//! 按统一约定组织各层原语：前向返回 `(输出, 缓存)`，反向按值消费缓存并给出
//! 精确解析梯度（缓存与反向一一配对由类型系统保证）。
//! [`FullyConnectedNet`] 将这些原语组装为可训练的多层分类器。

pub mod blocks;
pub mod grad_check;
pub mod init;
pub mod layers;
pub mod loss;
mod mode;
mod net;

pub use init::Init;
pub use mode::Mode;
pub use net::{FcNetConfig, FullyConnectedNet, LayerGrads, LayerParams, Normalization};

#[cfg(test)]
mod tests;
