use crate::errors::NetError;
use std::str::FromStr;

/// 前向传播模式
///
/// 同一次前向调用中的所有子层必须使用同一个模式值：
/// 批归一化据此选择 batch 统计量或运行统计量，dropout 据此决定是否生效。
/// 网络在每次调用开始时确定一次模式，并在任何子层执行之前传给全部子层。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 训练模式：归一化用 batch 统计量并更新运行统计量，dropout 生效
    Train,
    /// 评估模式：归一化只读运行统计量，dropout 为恒等映射
    Test,
}

impl FromStr for Mode {
    type Err = NetError;

    /// 从字符串解析模式，仅接受 `"train"` / `"test"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "test" => Ok(Self::Test),
            other => Err(NetError::InvalidMode(other.to_string())),
        }
    }
}
