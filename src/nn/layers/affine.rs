use ndarray::{Array1, Array2, ArrayD, Axis};

use crate::utils::traits::float::Dtype;

/// 仿射层前向传播保留的中间量，供反向传播按值消费。
pub struct AffineCache<F: Dtype> {
    x: ArrayD<F>,
    w: Array2<F>,
}

/// 仿射（全连接）层的前向传播。
///
/// 输入 `x` 的首维是批量维，其余维度会被展平成单个特征维后与 `w` 相乘。
///
/// # 参数
/// - `x`: 输入，形状 `(N, d_1, ..., d_k)`，展平后特征数须等于 `w` 的行数
/// - `w`: 权重，形状 `(D, M)`
/// - `b`: 偏置，形状 `(M,)`
///
/// # 返回
/// `(out, cache)`，其中 `out` 形状为 `(N, M)`
pub fn affine_forward<F: Dtype>(
    x: &ArrayD<F>,
    w: &Array2<F>,
    b: &Array1<F>,
) -> (Array2<F>, AffineCache<F>) {
    let n = x.shape()[0];
    let d = x.len() / n;
    let x_rows = x
        .to_owned()
        .into_shape((n, d))
        .expect("输入无法按样本展平");
    let out = x_rows.dot(w) + b;
    let cache = AffineCache {
        x: x.to_owned(),
        w: w.clone(),
    };
    (out, cache)
}

/// 仿射层的反向传播。
///
/// # 参数
/// - `dout`: 上游梯度，形状 `(N, M)`
/// - `cache`: 对应前向传播产生的缓存
///
/// # 返回
/// `(dx, dw, db)`，`dx` 与前向输入同形状
pub fn affine_backward<F: Dtype>(
    dout: &Array2<F>,
    cache: AffineCache<F>,
) -> (ArrayD<F>, Array2<F>, Array1<F>) {
    let AffineCache { x, w } = cache;
    let n = x.shape()[0];
    let d = x.len() / n;
    let x_dim = x.raw_dim();
    let x_rows = x.into_shape((n, d)).expect("输入无法按样本展平");
    let dx = dout
        .dot(&w.t())
        .into_shape(x_dim)
        .expect("梯度无法还原输入形状");
    let dw = x_rows.t().dot(dout);
    let db = dout.sum_axis(Axis(0));
    (dx, dw, db)
}
