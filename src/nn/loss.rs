//! # 分类损失
//!
//! 多分类 SVM 合页损失与 softmax 交叉熵，均返回 `(平均损失, 对打分的梯度)`。

use ndarray::{Array1, Array2};

use crate::errors::NetError;
use crate::utils::traits::float::Dtype;

fn check_labels<F: Dtype>(scores: &Array2<F>, y: &Array1<usize>) -> Result<(), NetError> {
    let (n, num_classes) = scores.dim();
    if y.len() != n {
        return Err(NetError::ShapeMismatch {
            expected: vec![n],
            got: vec![y.len()],
            message: "标签数必须与打分的批量一致".to_string(),
        });
    }
    for (i, &label) in y.iter().enumerate() {
        if label >= num_classes {
            return Err(NetError::LabelOutOfRange {
                index: i,
                label,
                num_classes,
            });
        }
    }
    Ok(())
}

/// 多分类 SVM（合页）损失。
///
/// 每个样本对每个错误类别计算 `max(0, s_j - s_y + 1)`，损失对批量取平均。
///
/// # 参数
/// - `scores`: 未归一化打分，形状 `(N, C)`
/// - `y`: 正确类别标签，形状 `(N,)`，取值须小于 `C`
///
/// # 返回
/// `(loss, dscores)`
pub fn svm_loss<F: Dtype>(
    scores: &Array2<F>,
    y: &Array1<usize>,
) -> Result<(F, Array2<F>), NetError> {
    check_labels(scores, y)?;
    let (n, num_classes) = scores.dim();
    let n_f = F::from_count(n);

    let mut loss = F::zero();
    let mut dx = Array2::<F>::zeros((n, num_classes));
    for i in 0..n {
        let correct = scores[[i, y[i]]];
        let mut violations = 0usize;
        for j in 0..num_classes {
            if j == y[i] {
                continue;
            }
            let margin = scores[[i, j]] - correct + F::one();
            if margin > F::zero() {
                loss += margin;
                dx[[i, j]] = F::one() / n_f;
                violations += 1;
            }
        }
        dx[[i, y[i]]] = -F::from_count(violations) / n_f;
    }
    Ok((loss / n_f, dx))
}

/// softmax 交叉熵损失。
///
/// 先逐样本减去最大打分再做指数运算，保证数值稳定。
///
/// # 参数
/// - `scores`: 未归一化打分，形状 `(N, C)`
/// - `y`: 正确类别标签，形状 `(N,)`，取值须小于 `C`
///
/// # 返回
/// `(loss, dscores)`，其中 `dscores = (softmax - one_hot) / N`
pub fn softmax_loss<F: Dtype>(
    scores: &Array2<F>,
    y: &Array1<usize>,
) -> Result<(F, Array2<F>), NetError> {
    check_labels(scores, y)?;
    let (n, num_classes) = scores.dim();
    let n_f = F::from_count(n);

    let mut loss = F::zero();
    let mut dx = Array2::<F>::zeros((n, num_classes));
    for i in 0..n {
        let mut max_score = scores[[i, 0]];
        for j in 1..num_classes {
            if scores[[i, j]] > max_score {
                max_score = scores[[i, j]];
            }
        }
        let mut sum_exp = F::zero();
        for j in 0..num_classes {
            sum_exp += (scores[[i, j]] - max_score).exp();
        }
        let log_sum = sum_exp.ln();
        loss -= scores[[i, y[i]]] - max_score - log_sum;
        for j in 0..num_classes {
            let p = (scores[[i, j]] - max_score).exp() / sum_exp;
            dx[[i, j]] = p / n_f;
        }
        dx[[i, y[i]]] -= F::one() / n_f;
    }
    Ok((loss / n_f, dx))
}
