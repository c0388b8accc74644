use ndarray::{Array, Dimension, Zip};

use crate::utils::traits::float::Dtype;

/// ReLU 前向传播保留的输入，供反向传播判定掩码。
pub struct ReluCache<F: Dtype, D: Dimension> {
    x: Array<F, D>,
}

/// 逐元素 ReLU 前向传播：`out = max(0, x)`，任意维度。
pub fn relu_forward<F: Dtype, D: Dimension>(x: &Array<F, D>) -> (Array<F, D>, ReluCache<F, D>) {
    let out = x.mapv(|v| if v > F::zero() { v } else { F::zero() });
    let cache = ReluCache { x: x.clone() };
    (out, cache)
}

/// ReLU 反向传播：输入不大于零处梯度置零（零点取次梯度 0）。
pub fn relu_backward<F: Dtype, D: Dimension>(
    dout: &Array<F, D>,
    cache: ReluCache<F, D>,
) -> Array<F, D> {
    let mut dx = dout.clone();
    Zip::from(&mut dx).and(&cache.x).for_each(|d, &x| {
        if x <= F::zero() {
            *d = F::zero();
        }
    });
    dx
}
