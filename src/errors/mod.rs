use thiserror::Error;

/// 神经网络库的统一错误类型
///
/// 所有错误都是编程或配置错误，不存在可重试的瞬态失败：
/// 任何一处失败都在部分计算发生之前返回。
#[derive(Error, Debug, PartialEq, Eq)]
pub enum NetError {
    /// 构造期配置错误（非法保留概率、通道数不可整除等），致命
    #[error("配置错误：{0}")]
    InvalidConfig(String),

    /// 模式字符串不在 {train, test} 之内
    #[error("无效模式：{0}（仅支持 train / test）")]
    InvalidMode(String),

    /// 操作数形状违反层的文档约定
    #[error("形状不匹配：预期{expected:?}，得到{got:?}。{message}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        message: String,
    },

    /// 结构上不可能完成的请求（卷积输出尺寸为零等）
    #[error("非法操作：{0}")]
    InvalidOperation(String),

    /// 损失函数收到越界标签
    #[error("标签越界：样本{index}的标签{label}不在 [0, {num_classes}) 内")]
    LabelOutOfRange {
        index: usize,
        label: usize,
        num_classes: usize,
    },

    /// 前向/反向配对被破坏（例如评估模式的前向缓存被拿去做训练反向）
    #[error("计算错误：{0}")]
    ComputationError(String),
}
