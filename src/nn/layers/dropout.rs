use ndarray::{Array, Dimension};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::errors::NetError;
use crate::nn::Mode;
use crate::utils::traits::float::Dtype;

/// 反向 dropout 前向传播保留的模式与掩码。
#[derive(Debug)]
pub struct DropoutCache<F: Dtype, D: Dimension> {
    mode: Mode,
    mask: Option<Array<F, D>>,
}

/// 反向 dropout 前向传播。
///
/// 训练模式按保留概率 `p` 采样掩码，保留的元素除以 `p` 进行缩放补偿，
/// 使输出的期望与输入一致，测试模式因而是恒等映射。
///
/// # 参数
/// - `x`: 输入，任意维度
/// - `p`: 保留概率，须满足 `0 < p <= 1`
/// - `mode`: 训练或测试
/// - `seed`: 给定时用固定种子采样掩码，同种子同形状的掩码完全一致
///
/// # 返回
/// `(out, cache)`
pub fn dropout_forward<F: Dtype, D: Dimension>(
    x: &Array<F, D>,
    p: f64,
    mode: Mode,
    seed: Option<u64>,
) -> Result<(Array<F, D>, DropoutCache<F, D>), NetError> {
    if !(p > 0.0 && p <= 1.0) {
        return Err(NetError::InvalidConfig(format!(
            "dropout 保留概率必须在 (0, 1] 内，实际为 {p}"
        )));
    }
    match mode {
        Mode::Train => {
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };
            let uniform = Uniform::new(0.0f64, 1.0);
            let keep = F::from_f64c(1.0 / p);
            let mask = x.map(|_| {
                if uniform.sample(&mut rng) < p {
                    keep
                } else {
                    F::zero()
                }
            });
            let out = x * &mask;
            let cache = DropoutCache {
                mode,
                mask: Some(mask),
            };
            Ok((out, cache))
        }
        Mode::Test => Ok((
            x.clone(),
            DropoutCache { mode, mask: None },
        )),
    }
}

/// 反向 dropout 的反向传播：训练模式套用前向的同一掩码，测试模式直通。
pub fn dropout_backward<F: Dtype, D: Dimension>(
    dout: &Array<F, D>,
    cache: DropoutCache<F, D>,
) -> Result<Array<F, D>, NetError> {
    match cache.mode {
        Mode::Train => {
            let mask = cache.mask.ok_or_else(|| {
                NetError::ComputationError("训练模式的 dropout 缓存缺少掩码".to_string())
            })?;
            Ok(dout * &mask)
        }
        Mode::Test => Ok(dout.clone()),
    }
}
