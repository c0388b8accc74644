use ndarray::ScalarOperand;
use num_traits::{Float, FromPrimitive};
use std::fmt::{Debug, Display};
use std::iter::Sum;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

/// 张量元素类型（计算精度）
///
/// 整个库对元素类型泛型化：`f32` 更快，`f64` 精度更高（数值梯度检查必须用 `f64`）。
/// 选择哪种精度即选择 `FullyConnectedNet<f32>` 或 `FullyConnectedNet<f64>`。
pub trait Dtype:
    Float
    + FromPrimitive
    + ScalarOperand
    + Debug
    + Display
    + Sum
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Send
    + Sync
    + 'static
{
    /// 把 `f64` 字面常量转换为当前精度（对 f32/f64 必然成功）
    fn from_f64c(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).expect("f64 常量转换失败")
    }

    /// 把 usize 计数（batch 大小、特征数等）转换为当前精度
    fn from_count(n: usize) -> Self {
        <Self as FromPrimitive>::from_usize(n).expect("usize 计数转换失败")
    }
}

impl Dtype for f32 {}
impl Dtype for f64 {}
