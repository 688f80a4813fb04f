//! 转换器规则数据结构与内置预设

use std::fmt;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// 旧式修改方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyType {
    /// 通配符：服务器指向伪装域名，Host/SNI 变为 伪装域名.原服务器
    Wildcard,
    /// 仅把 SNI 指向伪装域名，服务器与 Host 保持原样
    Sni,
    /// WebSocket：服务器指向伪装域名，Host/SNI 保持原样
    Ws,
    /// gRPC：覆盖逻辑与 ws 相同
    Grpc,
    /// 自定义：不做任何覆盖
    Custom,
}

impl ModifyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModifyType::Wildcard => "wildcard",
            ModifyType::Sni => "sni",
            ModifyType::Ws => "ws",
            ModifyType::Grpc => "grpc",
            ModifyType::Custom => "custom",
        }
    }
}

impl fmt::Display for ModifyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 端点三元组的解析模式
///
/// 三个端点模板只要有一个非空即整体视为模板模式，全空才回退旧式规则。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyMode<'a> {
    /// 旧式 modify_type 规则
    Legacy(ModifyType),
    /// 模板替换，空模板产出空串
    Template {
        server: &'a str,
        host: &'a str,
        sni: &'a str,
    },
}

/// 转换器规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Converter {
    /// 唯一命令名（查找键）
    pub name: String,
    /// 展示名，用于节点命名
    pub display_name: String,
    /// 伪装域名
    pub bug_host: String,
    /// 旧式修改方式
    pub modify_type: ModifyType,
    /// 服务器模板
    #[serde(default)]
    pub server_template: String,
    /// Host 模板
    #[serde(default)]
    pub host_template: String,
    /// SNI 模板
    #[serde(default)]
    pub sni_template: String,
    /// path 模板
    #[serde(default)]
    pub path_template: String,
    /// gRPC 服务名（模型兼容字段，算法未使用）
    #[serde(default)]
    pub grpc_service_name: String,
    /// 端口覆盖
    #[serde(default)]
    pub port_override: Option<u16>,
    /// 是否启用
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// 累计使用次数
    #[serde(default)]
    pub usage_count: u64,
    /// 创建者
    #[serde(default)]
    pub created_by: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Converter {
    /// 创建新的转换器规则
    pub fn new(name: &str, display_name: &str, bug_host: &str, modify_type: ModifyType) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            bug_host: bug_host.to_string(),
            modify_type,
            server_template: String::new(),
            host_template: String::new(),
            sni_template: String::new(),
            path_template: String::new(),
            grpc_service_name: String::new(),
            port_override: None,
            is_active: true,
            usage_count: 0,
            created_by: "system".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 设置端点模板（server/host/sni）
    pub fn with_templates(mut self, server: &str, host: &str, sni: &str) -> Self {
        self.server_template = server.to_string();
        self.host_template = host.to_string();
        self.sni_template = sni.to_string();
        self
    }

    /// 设置 path 模板
    pub fn with_path_template(mut self, path_template: &str) -> Self {
        self.path_template = path_template.to_string();
        self
    }

    /// 设置 gRPC 服务名
    pub fn with_grpc_service_name(mut self, grpc_service_name: &str) -> Self {
        self.grpc_service_name = grpc_service_name.to_string();
        self
    }

    /// 设置端口覆盖
    pub fn with_port_override(mut self, port: u16) -> Self {
        self.port_override = Some(port);
        self
    }

    /// 设置启用状态
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// 判定端点解析模式：三个模板全空才回退旧式规则
    pub fn modify_mode(&self) -> ModifyMode<'_> {
        if self.server_template.is_empty()
            && self.host_template.is_empty()
            && self.sni_template.is_empty()
        {
            ModifyMode::Legacy(self.modify_type)
        } else {
            ModifyMode::Template {
                server: &self.server_template,
                host: &self.host_template,
                sni: &self.sni_template,
            }
        }
    }
}

lazy_static! {
    /// 内置转换器预设
    pub static ref DEFAULT_CONVERTERS: Vec<Converter> = vec![
        Converter::new(
            "convertbizz",
            "XL-Line-WC",
            "ava.game.naver.com",
            ModifyType::Wildcard,
        )
        .with_path_template("/rsv"),
        Converter::new(
            "convertinsta",
            "XL-Instagram-SNI",
            "chat.instagram.com",
            ModifyType::Sni,
        ),
        Converter::new(
            "convertnetflix",
            "XL-Netflix-WS",
            "cache.netflix.com",
            ModifyType::Ws,
        )
        .with_path_template("/upvmess"),
        Converter::new(
            "convertgopay",
            "XL-Gopay-Midtrans-WC",
            "api.midtrans.com",
            ModifyType::Wildcard,
        )
        .with_grpc_service_name("vmess-grpc"),
        Converter::new(
            "convertgrpc",
            "Generic-gRPC",
            "cloudflare.com",
            ModifyType::Grpc,
        )
        .with_grpc_service_name("grpc-service"),
        Converter::new(
            "convertcustom",
            "Custom-Template-Demo",
            "cloudflare.com",
            ModifyType::Custom,
        )
        .with_templates(
            "{bug_host}",
            "{bug_host}.{original_server}",
            "{bug_host}.{original_server}",
        ),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modify_mode_legacy_when_all_templates_empty() {
        let converter = Converter::new("t", "T", "bug.test", ModifyType::Wildcard);
        assert_eq!(
            converter.modify_mode(),
            ModifyMode::Legacy(ModifyType::Wildcard)
        );
    }

    #[test]
    fn test_modify_mode_template_when_any_set() {
        let converter = Converter::new("t", "T", "bug.test", ModifyType::Wildcard)
            .with_templates("", "{bug_host}", "");
        assert!(matches!(converter.modify_mode(), ModifyMode::Template { .. }));
    }

    #[test]
    fn test_default_converters_presets() {
        assert_eq!(DEFAULT_CONVERTERS.len(), 6);

        let bizz = DEFAULT_CONVERTERS
            .iter()
            .find(|c| c.name == "convertbizz")
            .unwrap();
        assert_eq!(bizz.bug_host, "ava.game.naver.com");
        assert_eq!(bizz.modify_type, ModifyType::Wildcard);
        assert_eq!(bizz.path_template, "/rsv");
        assert!(bizz.is_active);

        let custom = DEFAULT_CONVERTERS
            .iter()
            .find(|c| c.name == "convertcustom")
            .unwrap();
        assert!(matches!(custom.modify_mode(), ModifyMode::Template { .. }));
    }

    #[test]
    fn test_converter_yaml_defaults() {
        // 手写配置文件可以省略可选字段
        let yaml = "
name: mini
display_name: Mini
bug_host: bug.test
modify_type: sni
";
        let converter: Converter = serde_yaml::from_str(yaml).unwrap();
        assert!(converter.is_active);
        assert_eq!(converter.usage_count, 0);
        assert_eq!(converter.port_override, None);
        assert_eq!(converter.modify_type, ModifyType::Sni);
    }

    #[test]
    fn test_converter_yaml_round_trip() {
        let converter = Converter::new("rt", "RT", "bug.test", ModifyType::Grpc)
            .with_path_template("/p")
            .with_port_override(8443)
            .with_active(false);

        let yaml = serde_yaml::to_string(&converter).unwrap();
        let parsed: Converter = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.name, "rt");
        assert_eq!(parsed.modify_type, ModifyType::Grpc);
        assert_eq!(parsed.port_override, Some(8443));
        assert!(!parsed.is_active);
    }
}
