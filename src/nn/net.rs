use ndarray::{Array1, Array2, ArrayD, Ix2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::errors::NetError;
use crate::utils::traits::float::Dtype;

use super::blocks::{
    affine_norm_relu_backward, affine_norm_relu_forward, affine_relu_backward,
    affine_relu_forward, AffineNormReluCache, AffineReluCache, NormLayer,
};
use super::init::Init;
use super::layers::{
    affine_backward, affine_forward, dropout_backward, dropout_forward, AffineCache,
    BatchNormState, DropoutCache,
};
use super::loss::softmax_loss;
use super::mode::Mode;

/// 隐藏层的归一化方案。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// 不做归一化
    #[default]
    None,
    /// 批归一化（带运行统计量）
    BatchNorm,
    /// 层归一化（无状态）
    LayerNorm,
}

/// 全连接网络的构建配置。
///
/// 默认值对应 CIFAR-10 规模的输入：`input_dim = 3 * 32 * 32`、十个类别、
/// 不归一化、不 dropout。
#[derive(Debug, Clone)]
pub struct FcNetConfig<F: Dtype> {
    /// 各隐藏层的宽度，长度即隐藏层数
    pub hidden_dims: Vec<usize>,
    /// 展平后的输入特征数
    pub input_dim: usize,
    /// 类别数
    pub num_classes: usize,
    /// dropout 保留概率；取 `1.0` 时完全不启用 dropout
    pub dropout_keep_ratio: f64,
    /// 隐藏层归一化方案
    pub normalization: Normalization,
    /// L2 正则强度（只作用于权重）
    pub reg: F,
    /// 权重初始化的正态分布标准差
    pub weight_scale: F,
    /// 随机种子：同时决定权重初始化与每次前向的 dropout 掩码
    pub seed: Option<u64>,
}

impl<F: Dtype> Default for FcNetConfig<F> {
    fn default() -> Self {
        Self {
            hidden_dims: vec![100],
            input_dim: 3 * 32 * 32,
            num_classes: 10,
            dropout_keep_ratio: 1.0,
            normalization: Normalization::None,
            reg: F::zero(),
            weight_scale: F::from_f64c(1e-2),
            seed: None,
        }
    }
}

/// 单层的可学习参数。`gamma` / `beta` 仅在该层带批归一化时存在。
#[derive(Debug, Clone)]
pub struct LayerParams<F: Dtype> {
    pub weight: Array2<F>,
    pub bias: Array1<F>,
    pub gamma: Option<Array1<F>>,
    pub beta: Option<Array1<F>>,
}

/// 单层参数的梯度，与 [`LayerParams`] 逐字段对应。
#[derive(Debug, Clone)]
pub struct LayerGrads<F: Dtype> {
    pub weight: Array2<F>,
    pub bias: Array1<F>,
    pub gamma: Option<Array1<F>>,
    pub beta: Option<Array1<F>>,
}

/// `{仿射 - [归一化] - ReLU - [dropout]} x (L-1) - 仿射 - softmax`
/// 结构的全连接分类网络。
///
/// 参数按层序存放，优化器遍历 [`Self::layers_mut`] 即可完成更新；
/// 批归一化的运行统计量存在网络自身，在训练前向中更新。
#[derive(Debug, Clone)]
pub struct FullyConnectedNet<F: Dtype> {
    layers: Vec<LayerParams<F>>,
    normalization: Normalization,
    keep_ratio: f64,
    use_dropout: bool,
    reg: F,
    bn_states: Vec<BatchNormState<F>>,
    ln_eps: F,
    seed: Option<u64>,
}

enum BlockCache<F: Dtype> {
    Plain(AffineReluCache<F>),
    Normed(AffineNormReluCache<F>),
}

struct HiddenCache<F: Dtype> {
    block: BlockCache<F>,
    dropout: Option<DropoutCache<F, Ix2>>,
}

impl<F: Dtype> FullyConnectedNet<F> {
    /// 按配置构建网络并初始化全部参数。
    ///
    /// 权重按 `N(0, weight_scale²)` 采样，偏置置零；带批归一化的隐藏层
    /// 额外持有 `gamma = 1`、`beta = 0` 与一份运行统计量。
    pub fn new(config: FcNetConfig<F>) -> Result<Self, NetError> {
        if config.input_dim == 0 || config.num_classes == 0 {
            return Err(NetError::InvalidConfig(
                "输入维度与类别数必须大于零".to_string(),
            ));
        }
        if config.hidden_dims.iter().any(|&d| d == 0) {
            return Err(NetError::InvalidConfig(
                "隐藏层宽度必须大于零".to_string(),
            ));
        }
        if !(config.dropout_keep_ratio > 0.0 && config.dropout_keep_ratio <= 1.0) {
            return Err(NetError::InvalidConfig(format!(
                "dropout 保留概率必须在 (0, 1] 内，实际为 {}",
                config.dropout_keep_ratio
            )));
        }
        if config.reg < F::zero() {
            return Err(NetError::InvalidConfig(
                "正则强度不能为负".to_string(),
            ));
        }
        if config.weight_scale <= F::zero() {
            return Err(NetError::InvalidConfig(
                "权重初始化标准差必须大于零".to_string(),
            ));
        }

        let mut dims = Vec::with_capacity(config.hidden_dims.len() + 2);
        dims.push(config.input_dim);
        dims.extend_from_slice(&config.hidden_dims);
        dims.push(config.num_classes);

        let mut rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let init = Init::Normal {
            mean: F::zero(),
            std: config.weight_scale,
        };
        let num_layers = dims.len() - 1;
        let mut layers = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let weight = init
                .generate(&[dims[i], dims[i + 1]], &mut rng)
                .into_dimensionality::<Ix2>()
                .expect("权重必须是二维");
            let bias = Array1::zeros(dims[i + 1]);
            // 输出层不带归一化，gamma/beta 只造给隐藏层
            let with_norm =
                i + 1 < num_layers && config.normalization == Normalization::BatchNorm;
            let (gamma, beta) = if with_norm {
                (
                    Some(Array1::from_elem(dims[i + 1], F::one())),
                    Some(Array1::zeros(dims[i + 1])),
                )
            } else {
                (None, None)
            };
            layers.push(LayerParams {
                weight,
                bias,
                gamma,
                beta,
            });
        }

        let bn_states = if config.normalization == Normalization::BatchNorm {
            config
                .hidden_dims
                .iter()
                .map(|&d| BatchNormState::new(d))
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            layers,
            normalization: config.normalization,
            keep_ratio: config.dropout_keep_ratio,
            use_dropout: config.dropout_keep_ratio < 1.0,
            reg: config.reg,
            bn_states,
            ln_eps: F::from_f64c(1e-5),
            seed: config.seed,
        })
    }

    /// 层数（含输出层）。
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// 按层序访问参数。
    pub fn layers(&self) -> &[LayerParams<F>] {
        &self.layers
    }

    /// 按层序可变访问参数，供优化器就地更新。
    pub fn layers_mut(&mut self) -> &mut [LayerParams<F>] {
        &mut self.layers
    }

    /// 各隐藏层的批归一化状态（非批归一化网络为空）。
    pub fn bn_states(&self) -> &[BatchNormState<F>] {
        &self.bn_states
    }

    fn forward(
        &mut self,
        x: &ArrayD<F>,
        mode: Mode,
    ) -> Result<(Array2<F>, Vec<HiddenCache<F>>, AffineCache<F>), NetError> {
        let num_hidden = self.layers.len() - 1;
        let mut caches = Vec::with_capacity(num_hidden);
        let mut h = x.clone();
        for i in 0..num_hidden {
            let params = &self.layers[i];
            let block = match self.normalization {
                Normalization::None => {
                    let (out, cache) =
                        affine_relu_forward(&h, &params.weight, &params.bias);
                    h = out.into_dyn();
                    BlockCache::Plain(cache)
                }
                Normalization::BatchNorm => {
                    let gamma = params
                        .gamma
                        .as_ref()
                        .ok_or_else(|| {
                            NetError::ComputationError(
                                "批归一化层缺少 gamma 参数".to_string(),
                            )
                        })?
                        .clone();
                    let beta = params
                        .beta
                        .as_ref()
                        .ok_or_else(|| {
                            NetError::ComputationError(
                                "批归一化层缺少 beta 参数".to_string(),
                            )
                        })?
                        .clone();
                    let (out, cache) = affine_norm_relu_forward(
                        &h,
                        &params.weight,
                        &params.bias,
                        &gamma,
                        &beta,
                        NormLayer::Batch {
                            state: &mut self.bn_states[i],
                            mode,
                        },
                    );
                    h = out.into_dyn();
                    BlockCache::Normed(cache)
                }
                Normalization::LayerNorm => {
                    // 层归一化在本网络里不带可学习的缩放与平移
                    let dim = params.bias.len();
                    let gamma = Array1::from_elem(dim, F::one());
                    let beta = Array1::zeros(dim);
                    let (out, cache) = affine_norm_relu_forward(
                        &h,
                        &params.weight,
                        &params.bias,
                        &gamma,
                        &beta,
                        NormLayer::Layer { eps: self.ln_eps },
                    );
                    h = out.into_dyn();
                    BlockCache::Normed(cache)
                }
            };
            let dropout = if self.use_dropout {
                let h2 = h
                    .clone()
                    .into_dimensionality::<Ix2>()
                    .expect("隐藏层输出必须是二维");
                let (out, cache) =
                    dropout_forward(&h2, self.keep_ratio, mode, self.seed)?;
                h = out.into_dyn();
                Some(cache)
            } else {
                None
            };
            caches.push(HiddenCache { block, dropout });
        }
        let last = &self.layers[num_hidden];
        let (scores, last_cache) = affine_forward(&h, &last.weight, &last.bias);
        Ok((scores, caches, last_cache))
    }

    /// 评估模式前向传播，返回未归一化打分，形状 `(N, num_classes)`。
    ///
    /// 不更新运行统计量，dropout 为恒等映射。
    pub fn scores(&mut self, x: &ArrayD<F>) -> Result<Array2<F>, NetError> {
        let (scores, _, _) = self.forward(x, Mode::Test)?;
        Ok(scores)
    }

    /// 训练模式前向加反向：返回带 L2 正则的平均 softmax 损失，以及与
    /// [`Self::layers`] 逐层对应的参数梯度。
    ///
    /// 批归一化的运行统计量在本调用中更新。
    pub fn loss(
        &mut self,
        x: &ArrayD<F>,
        y: &Array1<usize>,
    ) -> Result<(F, Vec<LayerGrads<F>>), NetError> {
        let (scores, mut caches, last_cache) = self.forward(x, Mode::Train)?;
        let (mut loss, dscores) = softmax_loss(&scores, y)?;

        let num_hidden = self.layers.len() - 1;
        let mut grads_rev = Vec::with_capacity(self.layers.len());

        let (dh, dw, db) = affine_backward(&dscores, last_cache);
        grads_rev.push(LayerGrads {
            weight: dw,
            bias: db,
            gamma: None,
            beta: None,
        });

        let mut dh = dh;
        for i in (0..num_hidden).rev() {
            let HiddenCache { block, dropout } =
                caches.pop().expect("隐藏层缓存数与层数不符");
            let mut dh2 = dh
                .into_dimensionality::<Ix2>()
                .expect("隐藏层梯度必须是二维");
            if let Some(cache) = dropout {
                dh2 = dropout_backward(&dh2, cache)?;
            }
            let grads = match block {
                BlockCache::Plain(cache) => {
                    let (dx, dw, db) = affine_relu_backward(&dh2, cache);
                    dh = dx;
                    LayerGrads {
                        weight: dw,
                        bias: db,
                        gamma: None,
                        beta: None,
                    }
                }
                BlockCache::Normed(cache) => {
                    let (dx, dw, db, dgamma, dbeta) =
                        affine_norm_relu_backward(&dh2, cache)?;
                    dh = dx;
                    if self.normalization == Normalization::BatchNorm {
                        LayerGrads {
                            weight: dw,
                            bias: db,
                            gamma: Some(dgamma),
                            beta: Some(dbeta),
                        }
                    } else {
                        // 层归一化的缩放与平移固定，不回传其梯度
                        LayerGrads {
                            weight: dw,
                            bias: db,
                            gamma: None,
                            beta: None,
                        }
                    }
                }
            };
            grads_rev.push(grads);
        }
        debug_assert_eq!(grads_rev.len(), self.layers.len());
        grads_rev.reverse();
        let mut grads = grads_rev;

        // L2 正则只作用于权重，损失项带 1/2 使梯度恰为 reg * W
        if self.reg > F::zero() {
            let half = F::from_f64c(0.5);
            for (params, grad) in self.layers.iter().zip(grads.iter_mut()) {
                loss += half * self.reg * params.weight.mapv(|v| v * v).sum();
                grad.weight = &grad.weight + &(&params.weight * self.reg);
            }
        }
        Ok((loss, grads))
    }
}
