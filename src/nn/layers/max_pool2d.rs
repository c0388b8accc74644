use ndarray::Array4;
use rayon::prelude::*;

use crate::errors::NetError;
use crate::utils::traits::float::Dtype;

/// 朴素最大池化前向传播保留的输入与窗口参数。
#[derive(Debug)]
pub struct MaxPool2dCache<F: Dtype> {
    x: Array4<F>,
    pool_h: usize,
    pool_w: usize,
    stride: usize,
}

/// 朴素（显式循环）最大池化前向传播，批内样本间用 rayon 并行。
///
/// 要求窗口恰好平铺输入平面：`(H - pool_h) % stride == 0`（宽同理），
/// 不满足时报错而不是静默丢弃边缘。
///
/// # 参数
/// - `x`: 输入，形状 `(N, C, H, W)`
/// - `pool_h` / `pool_w`: 池化窗口
/// - `stride`: 滑动步长，须大于零
///
/// # 返回
/// `(out, cache)`，`out` 形状 `(N, C, H', W')`
pub fn max_pool2d_forward<F: Dtype>(
    x: &Array4<F>,
    pool_h: usize,
    pool_w: usize,
    stride: usize,
) -> Result<(Array4<F>, MaxPool2dCache<F>), NetError> {
    let (n, c, h, w) = x.dim();
    if stride == 0 {
        return Err(NetError::InvalidConfig("池化步长必须大于零".to_string()));
    }
    if pool_h == 0 || pool_w == 0 || pool_h > h || pool_w > w {
        return Err(NetError::InvalidOperation(format!(
            "池化窗口 ({pool_h}, {pool_w}) 对输入平面 ({h}, {w}) 不合法"
        )));
    }
    if (h - pool_h) % stride != 0 || (w - pool_w) % stride != 0 {
        return Err(NetError::ShapeMismatch {
            expected: vec![pool_h, pool_w],
            got: vec![h, w],
            message: "池化窗口无法恰好平铺输入平面".to_string(),
        });
    }
    let out_h = (h - pool_h) / stride + 1;
    let out_w = (w - pool_w) / stride + 1;

    let per_sample: Vec<Vec<F>> = (0..n)
        .into_par_iter()
        .map(|ni| {
            let mut sample = Vec::with_capacity(c * out_h * out_w);
            for ci in 0..c {
                for oh in 0..out_h {
                    let h0 = oh * stride;
                    for ow in 0..out_w {
                        let w0 = ow * stride;
                        let mut best = x[[ni, ci, h0, w0]];
                        for ki in 0..pool_h {
                            for kj in 0..pool_w {
                                let v = x[[ni, ci, h0 + ki, w0 + kj]];
                                if v > best {
                                    best = v;
                                }
                            }
                        }
                        sample.push(best);
                    }
                }
            }
            sample
        })
        .collect();
    let flat: Vec<F> = per_sample.into_iter().flatten().collect();
    let out = Array4::from_shape_vec((n, c, out_h, out_w), flat)
        .expect("池化输出形状与元素数不符");

    let cache = MaxPool2dCache {
        x: x.clone(),
        pool_h,
        pool_w,
        stride,
    };
    Ok((out, cache))
}

/// 朴素最大池化的反向传播：每个窗口的梯度全部路由到该窗口的最大值处。
///
/// 窗口内出现并列最大值时，梯度只给行主序扫描中最先出现的那个位置，
/// 与前向采用同一判定（严格大于才更新）。
pub fn max_pool2d_backward<F: Dtype>(
    dout: &Array4<F>,
    cache: MaxPool2dCache<F>,
) -> Result<Array4<F>, NetError> {
    let MaxPool2dCache {
        x,
        pool_h,
        pool_w,
        stride,
    } = cache;
    let (n, c, h, w) = x.dim();
    let (dn, dc, out_h, out_w) = dout.dim();
    if dn != n || dc != c {
        return Err(NetError::ShapeMismatch {
            expected: vec![n, c, out_h, out_w],
            got: vec![dn, dc, out_h, out_w],
            message: "上游梯度的批量或通道数与缓存不符".to_string(),
        });
    }

    let per_sample: Vec<Vec<F>> = (0..n)
        .into_par_iter()
        .map(|ni| {
            let mut dx_s = vec![F::zero(); c * h * w];
            for ci in 0..c {
                for oh in 0..out_h {
                    let h0 = oh * stride;
                    for ow in 0..out_w {
                        let w0 = ow * stride;
                        let mut best = x[[ni, ci, h0, w0]];
                        let (mut bi, mut bj) = (0, 0);
                        for ki in 0..pool_h {
                            for kj in 0..pool_w {
                                let v = x[[ni, ci, h0 + ki, w0 + kj]];
                                if v > best {
                                    best = v;
                                    bi = ki;
                                    bj = kj;
                                }
                            }
                        }
                        let idx = ci * h * w + (h0 + bi) * w + (w0 + bj);
                        dx_s[idx] += dout[[ni, ci, oh, ow]];
                    }
                }
            }
            dx_s
        })
        .collect();
    let flat: Vec<F> = per_sample.into_iter().flatten().collect();
    let dx =
        Array4::from_shape_vec((n, c, h, w), flat).expect("输入梯度形状与元素数不符");
    Ok(dx)
}
