//! 转换错误类型定义

use thiserror::Error;

/// 链接转换过程中的错误分类
///
/// 所有错误都是终态的：不重试，由调用方记录日志后直接返回。
#[derive(Debug, Error)]
pub enum XrayError {
    /// 不支持的链接协议头
    #[error("不支持的链接格式: {0}")]
    UnsupportedScheme(String),

    /// base64 / JSON 解码失败
    #[error("解码失败: {0}")]
    DecodeFailure(String),

    /// URL 结构解析失败
    #[error("解析失败: {0}")]
    ParseFailure(String),

    /// 转换器不存在
    #[error("转换器不存在: {0}")]
    ConverterNotFound(String),

    /// 转换器已停用
    #[error("转换器已停用: {0}")]
    ConverterInactive(String),

    /// 当前配置无法重新生成链接
    #[error("无法生成链接: {0}")]
    LinkGenerationUnsupported(String),

    /// 转换器存储读写错误
    #[error("转换器存储错误: {0}")]
    Registry(String),
}

impl XrayError {
    /// 错误的简短分类名（用于日志与统计）
    pub fn kind(&self) -> &'static str {
        match self {
            XrayError::UnsupportedScheme(_) => "unsupported_scheme",
            XrayError::DecodeFailure(_) => "decode_failure",
            XrayError::ParseFailure(_) => "parse_failure",
            XrayError::ConverterNotFound(_) => "converter_not_found",
            XrayError::ConverterInactive(_) => "converter_inactive",
            XrayError::LinkGenerationUnsupported(_) => "link_generation_unsupported",
            XrayError::Registry(_) => "registry",
        }
    }
}
