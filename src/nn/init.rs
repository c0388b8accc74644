use crate::utils::traits::float::Dtype;
use ndarray::{ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

/// 参数初始化策略
///
/// 随机策略一律使用显式传入的 RNG，不依赖任何全局随机状态，
/// 以保证带种子时结果可完全复现。
#[derive(Debug, Clone)]
pub enum Init<F: Dtype> {
    /// 常数初始化
    Constant(F),
    /// 全零
    Zeros,
    /// 全一
    Ones,
    /// 正态分布
    Normal { mean: F, std: F },
    /// Kaiming/He 初始化（适用于 `ReLU`）
    Kaiming,
    /// Xavier/Glorot 初始化（适用于 Sigmoid/Tanh）
    Xavier,
}

impl<F: Dtype> Init<F> {
    /// 按指定形状生成初始化后的张量
    ///
    /// # 参数
    /// - `shape`: 目标形状；随机策略以 `shape[0]` 为 fan-in
    /// - `rng`: 显式随机数发生器
    pub fn generate(&self, shape: &[usize], rng: &mut StdRng) -> ArrayD<F> {
        match self {
            Self::Constant(v) => ArrayD::from_elem(IxDyn(shape), *v),
            Self::Zeros => ArrayD::zeros(IxDyn(shape)),
            Self::Ones => ArrayD::from_elem(IxDyn(shape), F::one()),
            Self::Normal { mean, std } => normal(*mean, *std, shape, rng),
            Self::Kaiming => {
                let fan_in = shape[0];
                let std = F::from_f64c((2.0 / fan_in as f64).sqrt());
                normal(F::zero(), std, shape, rng)
            }
            Self::Xavier => {
                let fan_in = shape[0];
                let fan_out = shape.get(1).copied().unwrap_or(1);
                let std = F::from_f64c((2.0 / (fan_in + fan_out) as f64).sqrt());
                normal(F::zero(), std, shape, rng)
            }
        }
    }
}

/// Box-Muller 变换采样正态分布
fn normal<F: Dtype>(mean: F, std: F, shape: &[usize], rng: &mut StdRng) -> ArrayD<F> {
    let len = shape.iter().product::<usize>();
    let uniform = Uniform::new(f64::EPSILON, 1.0);
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let u1 = uniform.sample(rng);
        let u2 = uniform.sample(rng);
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        data.push(mean + std * F::from_f64c(r * theta.cos()));
        if data.len() < len {
            data.push(mean + std * F::from_f64c(r * theta.sin()));
        }
    }
    ArrayD::from_shape_vec(IxDyn(shape), data).expect("形状与数据长度不一致")
}
