//! # Naive Net
//!
//! `naive_net`是一个面向教学的神经网络库：以最朴素（naive）、可核验的方式实现
//! 全连接、卷积、各类归一化、dropout 等层的前向/反向传播，并将它们组装为可配置的
//! 多层分类器（[`nn::FullyConnectedNet`]）。
//!
//! 设计重点不在算力，而在两件事：
//! 1. 每个原语层的解析梯度与数值梯度（中心差分）完全吻合；
//! 2. 多层网络中缓存的传递、可选子层（归一化/dropout）的链式求导
//!    以及正则化梯度的合并完全正确。
//!
//! 参数更新不在本库职责内：外部优化器按层索引读取梯度记录并回写参数记录。

pub mod errors;
pub mod nn;
pub mod utils;
