//! XRay 链接检测与解析
//!
//! 支持 vmess（base64-JSON 与 URL 双格式）、vless、trojan、ss 四种协议。

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use url::Url;

use super::error::XrayError;
use super::types::{DetectedConfig, Protocol, RawConfig};

/// 端口缺失或无法解析时的默认值
const DEFAULT_PORT: u16 = 443;

/// 检测并解析 XRay 分享链接
pub fn detect(link: &str) -> Result<DetectedConfig, XrayError> {
    // 1. 去除首尾空白和换行
    let link = link.trim();

    // 2. 按 scheme 前缀分发协议
    if let Some(payload) = link.strip_prefix("vmess://") {
        // vmess 双格式：含未转义 @ 的是 URL 形式，否则为 base64-JSON
        if payload.contains('@') {
            parse_url_format(link, Protocol::Vmess)
        } else {
            parse_vmess_json(payload)
        }
    } else if link.starts_with("vless://") {
        parse_url_format(link, Protocol::Vless)
    } else if link.starts_with("trojan://") {
        parse_url_format(link, Protocol::Trojan)
    } else if link.starts_with("ss://") {
        parse_url_format(link, Protocol::Shadowsocks)
    } else {
        Err(XrayError::UnsupportedScheme(scheme_of(link)))
    }
}

/// 取链接的 scheme 部分用于报错
fn scheme_of(link: &str) -> String {
    match link.split_once("://") {
        Some((scheme, _)) => scheme.to_string(),
        None => link.chars().take(32).collect(),
    }
}

/// base64 解码：先按标准字母表，失败后回退 URL-safe 字母表
fn decode_base64(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
}

/// 解析 vmess base64-JSON 格式
fn parse_vmess_json(payload: &str) -> Result<DetectedConfig, XrayError> {
    // 1. base64 解码
    let json_data = decode_base64(payload)
        .map_err(|e| XrayError::DecodeFailure(format!("vmess base64 解码失败: {}", e)))?;

    // 2. 解析为 JSON 对象
    let value: serde_json::Value = serde_json::from_slice(&json_data)
        .map_err(|e| XrayError::DecodeFailure(format!("vmess JSON 解析失败: {}", e)))?;
    let map = match value {
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(XrayError::DecodeFailure(
                "vmess 载荷不是 JSON 对象".to_string(),
            ));
        }
    };

    // 3. 逐字段提取，port/aid 兼容字符串与数字两种写法
    let server = json_str(&map, "add").unwrap_or_default().to_string();
    let port = json_u16(&map, "port").unwrap_or(DEFAULT_PORT);
    let identifier = json_str(&map, "id").unwrap_or_default().to_string();
    let mut network = json_str(&map, "net").unwrap_or_default().to_string();
    if network.is_empty() {
        network = "tcp".to_string();
    }
    let tls = json_str(&map, "tls") == Some("tls");
    let sni = json_str(&map, "sni").unwrap_or_default().to_string();
    let host = json_str(&map, "host").unwrap_or_default().to_string();
    let path = json_str(&map, "path").unwrap_or_default().to_string();
    let alter_id = json_u16(&map, "aid").unwrap_or(0);
    let remarks = json_str(&map, "ps").unwrap_or_default().to_string();

    // 4. gRPC 的服务名复用 path 字段
    let service_name = if network == "grpc" {
        path.clone()
    } else {
        String::new()
    };

    Ok(DetectedConfig {
        protocol: Protocol::Vmess,
        server,
        port,
        identifier,
        network,
        tls,
        sni,
        host,
        path,
        service_name,
        header_type: String::new(),
        alter_id,
        remarks,
        raw: RawConfig::Json(map),
    })
}

/// 解析 URL 形式链接（vless、trojan、ss 以及 URL 形式的 vmess）
fn parse_url_format(link: &str, protocol: Protocol) -> Result<DetectedConfig, XrayError> {
    // 1. URL 结构解析
    let parsed =
        Url::parse(link).map_err(|e| XrayError::ParseFailure(format!("URL 解析失败: {}", e)))?;

    let server = parsed.host_str().unwrap_or_default().to_string();
    let port = parsed.port().unwrap_or(DEFAULT_PORT);

    // 2. userinfo 与 fragment 需要百分号解码
    let identifier = percent_decode(parsed.username());
    let remarks = percent_decode(parsed.fragment().unwrap_or_default());

    // 3. 查询参数按首次出现取值
    let mut query: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in parsed.query_pairs() {
        query.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    let q = |key: &str| query.get(key).cloned().unwrap_or_default();

    let mut network = q("type");
    if network.is_empty() {
        network = "tcp".to_string();
    }
    let security = q("security");
    let tls = security == "tls";

    let mut sni = q("sni");
    if sni.is_empty() {
        sni = q("host");
    }
    let mut host = q("host");
    if host.is_empty() {
        host = server.clone();
    }

    // 4. path 优先取查询参数，ws/httpupgrade 回退到 URL 路径段
    let mut path = q("path");
    if path.is_empty() && (network == "ws" || network == "httpupgrade") {
        path = parsed.path().to_string();
    }
    // 处理多重编码（如 %252F -> %2F -> /）
    if !path.is_empty() {
        path = decode_path_fully(&path);
    }

    let mut service_name = q("serviceName");
    if service_name.is_empty() {
        service_name = q("service");
    }
    let mut header_type = q("headerType");
    if header_type.is_empty() {
        header_type = q("header");
    }

    // 5. 构造原始键值包：建模字段快照在前，原始查询参数整体并入
    let mut raw = BTreeMap::new();
    raw.insert("protocol".to_string(), protocol.as_str().to_string());
    raw.insert("server".to_string(), server.clone());
    raw.insert("port".to_string(), port.to_string());
    raw.insert("uuid".to_string(), identifier.clone());
    raw.insert("network".to_string(), network.clone());
    raw.insert("security".to_string(), security.clone());
    raw.insert("remarks".to_string(), remarks.clone());
    if tls {
        raw.insert("tls".to_string(), "tls".to_string());
        raw.insert("sni".to_string(), sni.clone());
    }
    if !host.is_empty() {
        raw.insert("host".to_string(), host.clone());
    }
    if !path.is_empty() {
        raw.insert("path".to_string(), path.clone());
    }
    if !service_name.is_empty() {
        raw.insert("serviceName".to_string(), service_name.clone());
    }
    if !header_type.is_empty() {
        raw.insert("headerType".to_string(), header_type.clone());
    }
    for (k, v) in &query {
        raw.insert(k.clone(), v.clone());
    }
    // path 保留查询串里的原始形态，重新生成链接时原样输出、不再转义
    if let Some(raw_path) = raw_query_value(&parsed, "path") {
        raw.insert("path".to_string(), raw_path);
    }

    Ok(DetectedConfig {
        protocol,
        server,
        port,
        identifier,
        network,
        tls,
        sni,
        host,
        path,
        service_name,
        header_type,
        alter_id: 0,
        remarks,
        raw: RawConfig::Url(raw),
    })
}

/// 从原始查询串中取指定键的未解码值（首次出现）
fn raw_query_value(url: &Url, name: &str) -> Option<String> {
    for pair in url.query()?.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k == name {
            return Some(v.to_string());
        }
    }
    None
}

/// 循环解码 path 直到不再变化（处理多层编码），无编码时原样返回
fn decode_path_fully(path: &str) -> String {
    let mut current = path.to_string();
    while current.contains('%') {
        match urlencoding::decode(&current) {
            Ok(decoded) => {
                if decoded.as_ref() == current.as_str() {
                    break;
                }
                current = decoded.into_owned();
            }
            Err(_) => break,
        }
    }
    current
}

/// 百分号解码，失败时原样返回
fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// JSON 对象中按键取字符串值（仅认字符串类型）
fn json_str<'a>(map: &'a serde_json::Map<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(|v| v.as_str())
}

/// JSON 对象中按键取 u16，兼容字符串与数字
fn json_u16(map: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<u16> {
    match map.get(key)? {
        serde_json::Value::String(s) => s.trim().parse::<u16>().ok(),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_u64() {
                u16::try_from(i).ok()
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && *f <= f64::from(u16::MAX))
                    .map(|f| f as u16)
            }
        }
        _ => None,
    }
}
