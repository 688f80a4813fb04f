//! XRay 链接配置数据结构定义

use std::collections::BTreeMap;
use std::fmt;

use crate::converter::ModifyType;

/// 支持的链接协议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
}

impl Protocol {
    /// 协议的小写名称（链接 scheme 与 YAML type 字段共用）
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "ss",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 原始配置键值包
///
/// VMess base64 链接解码后的 JSON 对象整体保留；URL 形式链接保留
/// 建模字段快照加全部查询参数。修改阶段在它的克隆上就地改写，
/// 未建模的键原样跟随到输出链接。
#[derive(Debug, Clone, PartialEq)]
pub enum RawConfig {
    /// VMess base64-JSON：解码出的完整 JSON 对象
    Json(serde_json::Map<String, serde_json::Value>),
    /// URL 形式：有序字符串键值对
    Url(BTreeMap<String, String>),
}

impl RawConfig {
    /// 按键读取字符串值（JSON 变体只认字符串类型的值）
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self {
            RawConfig::Json(map) => map.get(key).and_then(|v| v.as_str()),
            RawConfig::Url(map) => map.get(key).map(|v| v.as_str()),
        }
    }

    /// 写入字符串值
    pub fn set_str(&mut self, key: &str, value: String) {
        match self {
            RawConfig::Json(map) => {
                map.insert(key.to_string(), serde_json::Value::String(value));
            }
            RawConfig::Url(map) => {
                map.insert(key.to_string(), value);
            }
        }
    }

    /// 服务器地址字段名随格式不同（JSON 用 add，URL 用 server）
    pub fn server_key(&self) -> &'static str {
        match self {
            RawConfig::Json(_) => "add",
            RawConfig::Url(_) => "server",
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, RawConfig::Json(_))
    }
}

/// 检测出的链接配置（检测完成后不再修改）
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedConfig {
    /// 协议类型
    pub protocol: Protocol,
    /// 服务器地址
    pub server: String,
    /// 端口号（缺失或无法解析时为 443）
    pub port: u16,
    /// UUID 或密码（已做百分号解码）
    pub identifier: String,
    /// 传输层类型（缺省 tcp）
    pub network: String,
    /// 是否启用 TLS
    pub tls: bool,
    /// TLS SNI
    pub sni: String,
    /// 伪装 Host
    pub host: String,
    /// 传输路径（已完全解码）
    pub path: String,
    /// gRPC 服务名
    pub service_name: String,
    /// 伪装头类型
    pub header_type: String,
    /// VMess alterId
    pub alter_id: u16,
    /// 节点备注名
    pub remarks: String,
    /// 原始键值包
    pub raw: RawConfig,
}

impl DetectedConfig {
    /// 获取服务器地址（server:port）
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

/// 修改后的配置与输出产物
#[derive(Debug, Clone)]
pub struct ModifiedConfig {
    /// 检测结果的副本
    pub detected: DetectedConfig,
    /// 使用的修改模式
    pub modify_type: ModifyType,
    /// 转换器的伪装域名
    pub bug_host: String,
    /// 解析出的目标服务器（模板为空时为空串）
    pub modified_server: String,
    /// 解析出的目标 Host
    pub modified_host: String,
    /// 解析出的目标 SNI
    pub modified_sni: String,
    /// 重新生成的分享链接
    pub modified_link: String,
    /// Clash 格式的 YAML 配置块
    pub yaml_config: String,
}
