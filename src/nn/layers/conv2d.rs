use ndarray::{s, Array1, Array4};
use rayon::prelude::*;

use crate::errors::NetError;
use crate::utils::traits::float::Dtype;

/// 朴素卷积前向传播保留的中间量。缓存里存的是补零后的输入，
/// 反向传播可以直接在同一坐标系里累加，最后再裁掉补零边。
#[derive(Debug)]
pub struct Conv2dCache<F: Dtype> {
    x_padded: Array4<F>,
    w: Array4<F>,
    stride: usize,
    pad: usize,
}

fn conv_out_len(input: usize, kernel: usize, stride: usize, pad: usize) -> usize {
    (input + 2 * pad - kernel) / stride + 1
}

/// 朴素（显式循环）卷积前向传播。
///
/// 按公式逐点计算互相关，不做 im2col 之类的重排优化，批内样本间用
/// rayon 并行。
///
/// # 参数
/// - `x`: 输入，形状 `(N, C, H, W)`
/// - `w`: 卷积核，形状 `(K, C, FH, FW)`
/// - `b`: 逐核偏置，形状 `(K,)`
/// - `stride`: 滑动步长，须大于零
/// - `pad`: 四周补零的圈数
///
/// # 返回
/// `(out, cache)`，`out` 形状 `(N, K, H', W')`，
/// 其中 `H' = (H + 2*pad - FH) / stride + 1`（`W'` 同理）
pub fn conv2d_forward<F: Dtype>(
    x: &Array4<F>,
    w: &Array4<F>,
    b: &Array1<F>,
    stride: usize,
    pad: usize,
) -> Result<(Array4<F>, Conv2dCache<F>), NetError> {
    let (n, c, h, wd) = x.dim();
    let (k, kc, kh, kw) = w.dim();
    if c != kc {
        return Err(NetError::ShapeMismatch {
            expected: vec![k, c, kh, kw],
            got: vec![k, kc, kh, kw],
            message: "卷积核的通道数必须与输入一致".to_string(),
        });
    }
    if stride == 0 {
        return Err(NetError::InvalidConfig("卷积步长必须大于零".to_string()));
    }
    let h_pad = h + 2 * pad;
    let w_pad = wd + 2 * pad;
    if kh > h_pad || kw > w_pad {
        return Err(NetError::InvalidOperation(format!(
            "卷积核 ({kh}, {kw}) 超出补零后的输入 ({h_pad}, {w_pad})"
        )));
    }
    let out_h = conv_out_len(h, kh, stride, pad);
    let out_w = conv_out_len(wd, kw, stride, pad);

    let mut x_padded = Array4::<F>::zeros((n, c, h_pad, w_pad));
    x_padded
        .slice_mut(s![.., .., pad..pad + h, pad..pad + wd])
        .assign(x);

    let per_sample: Vec<Vec<F>> = (0..n)
        .into_par_iter()
        .map(|ni| {
            let mut sample = Vec::with_capacity(k * out_h * out_w);
            for fi in 0..k {
                for oh in 0..out_h {
                    let h0 = oh * stride;
                    for ow in 0..out_w {
                        let w0 = ow * stride;
                        let mut acc = b[fi];
                        for ci in 0..c {
                            for ki in 0..kh {
                                for kj in 0..kw {
                                    acc += x_padded[[ni, ci, h0 + ki, w0 + kj]]
                                        * w[[fi, ci, ki, kj]];
                                }
                            }
                        }
                        sample.push(acc);
                    }
                }
            }
            sample
        })
        .collect();
    let flat: Vec<F> = per_sample.into_iter().flatten().collect();
    let out = Array4::from_shape_vec((n, k, out_h, out_w), flat)
        .expect("卷积输出形状与元素数不符");

    let cache = Conv2dCache {
        x_padded,
        w: w.clone(),
        stride,
        pad,
    };
    Ok((out, cache))
}

/// 朴素卷积的反向传播。
///
/// `dx` 逐样本并行计算（样本间独立），`dw` 与 `db` 先逐样本求局部贡献
/// 再串行归约，避免并行写同一块参数梯度。
///
/// # 返回
/// `(dx, dw, db)`
pub fn conv2d_backward<F: Dtype>(
    dout: &Array4<F>,
    cache: Conv2dCache<F>,
) -> Result<(Array4<F>, Array4<F>, Array1<F>), NetError> {
    let Conv2dCache {
        x_padded,
        w,
        stride,
        pad,
    } = cache;
    let (n, c, h_pad, w_pad) = x_padded.dim();
    let (k, _, kh, kw) = w.dim();
    let (dn, dk, out_h, out_w) = dout.dim();
    if dn != n || dk != k {
        return Err(NetError::ShapeMismatch {
            expected: vec![n, k, out_h, out_w],
            got: vec![dn, dk, out_h, out_w],
            message: "上游梯度的批量或卷积核数与缓存不符".to_string(),
        });
    }

    let dx_per_sample: Vec<Vec<F>> = (0..n)
        .into_par_iter()
        .map(|ni| {
            let mut dx_pad = vec![F::zero(); c * h_pad * w_pad];
            for fi in 0..k {
                for oh in 0..out_h {
                    let h0 = oh * stride;
                    for ow in 0..out_w {
                        let w0 = ow * stride;
                        let g = dout[[ni, fi, oh, ow]];
                        for ci in 0..c {
                            for ki in 0..kh {
                                for kj in 0..kw {
                                    let idx =
                                        ci * h_pad * w_pad + (h0 + ki) * w_pad + (w0 + kj);
                                    dx_pad[idx] += g * w[[fi, ci, ki, kj]];
                                }
                            }
                        }
                    }
                }
            }
            dx_pad
        })
        .collect();
    let flat: Vec<F> = dx_per_sample.into_iter().flatten().collect();
    let dx_padded = Array4::from_shape_vec((n, c, h_pad, w_pad), flat)
        .expect("输入梯度形状与元素数不符");
    let dx = dx_padded
        .slice(s![.., .., pad..h_pad - pad, pad..w_pad - pad])
        .to_owned();

    let partials: Vec<(Array4<F>, Array1<F>)> = (0..n)
        .into_par_iter()
        .map(|ni| {
            let mut dw_s = Array4::<F>::zeros((k, c, kh, kw));
            let mut db_s = Array1::<F>::zeros(k);
            for fi in 0..k {
                for oh in 0..out_h {
                    let h0 = oh * stride;
                    for ow in 0..out_w {
                        let w0 = ow * stride;
                        let g = dout[[ni, fi, oh, ow]];
                        db_s[fi] += g;
                        for ci in 0..c {
                            for ki in 0..kh {
                                for kj in 0..kw {
                                    dw_s[[fi, ci, ki, kj]] +=
                                        g * x_padded[[ni, ci, h0 + ki, w0 + kj]];
                                }
                            }
                        }
                    }
                }
            }
            (dw_s, db_s)
        })
        .collect();
    let mut dw = Array4::<F>::zeros((k, c, kh, kw));
    let mut db = Array1::<F>::zeros(k);
    for (dw_s, db_s) in partials {
        dw += &dw_s;
        db += &db_s;
    }
    Ok((dx, dw, db))
}
