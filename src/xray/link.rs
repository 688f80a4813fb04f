//! 分享链接重新生成
//!
//! vmess base64-JSON 走 JSON 序列化，URL 形式按固定参数顺序拼装。

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::error::XrayError;
use super::types::{Protocol, RawConfig};

/// 拼装查询串时已单独处理过的键，余量透传阶段跳过
const HANDLED_KEYS: &[&str] = &[
    "protocol",
    "server",
    "port",
    "uuid",
    "remarks",
    "network",
    "security",
    "tls",
    "sni",
    "host",
    "path",
    "serviceName",
    "type",
];

/// 从修改后的键值包重新生成分享链接
pub fn generate_link(config: &RawConfig, protocol: Protocol) -> Result<String, XrayError> {
    match config {
        RawConfig::Json(map) => generate_vmess_link(map),
        RawConfig::Url(map) => generate_url_link(map, protocol),
    }
}

/// vmess base64-JSON 链接：JSON 序列化后按标准字母表编码
fn generate_vmess_link(
    map: &serde_json::Map<String, serde_json::Value>,
) -> Result<String, XrayError> {
    let json = serde_json::to_string(map).map_err(|e| {
        XrayError::LinkGenerationUnsupported(format!("vmess JSON 序列化失败: {}", e))
    })?;
    Ok(format!("vmess://{}", STANDARD.encode(json)))
}

/// URL 形式链接：scheme://identifier@server:port?query#fragment
fn generate_url_link(
    map: &BTreeMap<String, String>,
    protocol: Protocol,
) -> Result<String, XrayError> {
    let get = |key: &str| map.get(key).map(String::as_str).unwrap_or("");

    let server = get("server");
    let port = get("port");
    let uuid = get("uuid");
    let remarks = get("remarks");

    if server.is_empty() || port.is_empty() || uuid.is_empty() {
        return Err(XrayError::LinkGenerationUnsupported(format!(
            "{} 链接缺少 server/port/uuid 字段",
            protocol
        )));
    }

    let mut link = format!(
        "{}://{}@{}:{}",
        protocol.as_str(),
        urlencoding::encode(uuid),
        server,
        port
    );

    // 1. 固定顺序拼装建模参数，保证输出稳定
    let mut params: Vec<(String, String)> = Vec::new();

    let network = get("network");
    if !network.is_empty() && network != "tcp" {
        params.push(("type".to_string(), network.to_string()));
    }

    let mut security = get("security").to_string();
    let tls_flag = matches!(get("tls"), "tls" | "true");
    if tls_flag {
        security = "tls".to_string();
    }
    if !security.is_empty() {
        params.push(("security".to_string(), security.clone()));
    }
    if security == "tls" {
        let sni = get("sni");
        if !sni.is_empty() {
            params.push(("sni".to_string(), sni.to_string()));
        }
    }

    let host = get("host");
    if !host.is_empty() && host != server {
        params.push(("host".to_string(), host.to_string()));
    }

    let path = get("path");
    if !path.is_empty() {
        params.push(("path".to_string(), path.to_string()));
    }

    let service_name = get("serviceName");
    if !service_name.is_empty() {
        params.push(("serviceName".to_string(), service_name.to_string()));
    }

    // 2. 余量参数透传：跳过已处理键与空值/"0"/"false"
    for (key, value) in map {
        if HANDLED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if value.is_empty() || value == "0" || value == "false" {
            continue;
        }
        params.push((key.clone(), value.clone()));
    }

    // 3. path 原样输出不再转义，其余值做百分号编码
    if !params.is_empty() {
        let query: Vec<String> = params
            .iter()
            .map(|(key, value)| {
                if key == "path" {
                    format!("{}={}", key, value)
                } else {
                    format!("{}={}", key, urlencoding::encode(value))
                }
            })
            .collect();
        link.push('?');
        link.push_str(&query.join("&"));
    }

    if !remarks.is_empty() {
        link.push('#');
        link.push_str(&urlencoding::encode(remarks));
    }

    Ok(link)
}
