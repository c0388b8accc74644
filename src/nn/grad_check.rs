//! # 数值梯度检验
//!
//! 用中心有限差分近似梯度，与各层的解析反向传播对照。为了获得足够的
//! 数值精度，检验固定在 `f64` 上进行。

use ndarray::ArrayD;

/// 对标量函数 `f` 在 `x` 处做中心有限差分：
/// `df/dx_i ≈ (f(x + h·e_i) - f(x - h·e_i)) / (2h)`。
///
/// # 参数
/// - `f`: 待求导的标量函数
/// - `x`: 求导点
/// - `h`: 差分步长，常用 `1e-5`
pub fn eval_numerical_gradient(
    mut f: impl FnMut(&ArrayD<f64>) -> f64,
    x: &ArrayD<f64>,
    h: f64,
) -> ArrayD<f64> {
    let dim = x.raw_dim();
    let base: Vec<f64> = x.iter().copied().collect();
    let mut grad = Vec::with_capacity(base.len());
    for i in 0..base.len() {
        let mut probe = base.clone();
        probe[i] = base[i] + h;
        let pos = f(&ArrayD::from_shape_vec(dim.clone(), probe.clone()).expect("探针形状不符"));
        probe[i] = base[i] - h;
        let neg = f(&ArrayD::from_shape_vec(dim.clone(), probe).expect("探针形状不符"));
        grad.push((pos - neg) / (2.0 * h));
    }
    ArrayD::from_shape_vec(dim, grad).expect("梯度形状不符")
}

/// 对数组值函数 `f` 做中心有限差分，同时用上游梯度 `dout` 做链式收缩：
/// 返回 `d(sum(f(x) ⊙ dout)) / dx`。
pub fn eval_numerical_gradient_array(
    mut f: impl FnMut(&ArrayD<f64>) -> ArrayD<f64>,
    x: &ArrayD<f64>,
    dout: &ArrayD<f64>,
    h: f64,
) -> ArrayD<f64> {
    let dim = x.raw_dim();
    let base: Vec<f64> = x.iter().copied().collect();
    let mut grad = Vec::with_capacity(base.len());
    for i in 0..base.len() {
        let mut probe = base.clone();
        probe[i] = base[i] + h;
        let pos = f(&ArrayD::from_shape_vec(dim.clone(), probe.clone()).expect("探针形状不符"));
        probe[i] = base[i] - h;
        let neg = f(&ArrayD::from_shape_vec(dim.clone(), probe).expect("探针形状不符"));
        grad.push(((&pos - &neg) * dout).sum() / (2.0 * h));
    }
    ArrayD::from_shape_vec(dim, grad).expect("梯度形状不符")
}

/// 两个梯度数组的最大相对误差：
/// `max_i |a_i - b_i| / max(1e-8, |a_i| + |b_i|)`。
pub fn rel_error(a: &ArrayD<f64>, b: &ArrayD<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&u, &v)| (u - v).abs() / f64::max(1e-8, u.abs() + v.abs()))
        .fold(0.0, f64::max)
}
