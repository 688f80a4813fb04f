//! 配置修改：按转换器规则改写检测结果并生成输出产物

use crate::converter::{Converter, ModifyMode, ModifyType};

use super::error::XrayError;
use super::link;
use super::types::{DetectedConfig, ModifiedConfig};
use super::yaml;

/// 按转换器规则修改配置，返回新链接与 YAML 配置块
pub fn modify(
    detected: &DetectedConfig,
    converter: &Converter,
) -> Result<ModifiedConfig, XrayError> {
    // 1. 在键值包副本上改写，检测结果保持只读
    let mut working = detected.raw.clone();

    // 2. 解析目标 server/host/sni 三元组（模板与旧式规则二选一）
    let (modified_server, modified_host, modified_sni) = resolve_endpoints(converter, detected);

    // 3. 非空结果写回键值包，SNI 仅在 TLS 开启时写入
    let server_key = working.server_key();
    if !modified_server.is_empty() {
        working.set_str(server_key, modified_server.clone());
    }
    if !modified_host.is_empty() {
        working.set_str("host", modified_host.clone());
    }
    if detected.tls && !modified_sni.is_empty() {
        working.set_str("sni", modified_sni.clone());
    }

    // 4. path 模板仅对 ws/httpupgrade/h2 网络且修改方式为 ws/grpc 时生效
    let mut effective_path = detected.path.clone();
    if path_template_applies(converter, &detected.network) {
        working.set_str("path", converter.path_template.clone());
        effective_path = converter.path_template.clone();
    }

    // 5. 端口覆盖（字符串形式写入键值包）
    if let Some(port) = converter.port_override {
        working.set_str("port", port.to_string());
    }

    // 6. 重新生成分享链接
    let modified_link = link::generate_link(&working, detected.protocol)?;

    // 7. 生成 Clash YAML 配置块
    let yaml_config = yaml::generate_yaml_config(detected, &working, converter, &effective_path);

    Ok(ModifiedConfig {
        detected: detected.clone(),
        modify_type: converter.modify_type,
        bug_host: converter.bug_host.clone(),
        modified_server,
        modified_host,
        modified_sni,
        modified_link,
        yaml_config,
    })
}

/// 解析目标 server/host/sni 三元组
///
/// 三个端点模板只要有一个非空就整体走模板替换；全空时回退旧式
/// modify_type 规则。custom 不做任何覆盖。
fn resolve_endpoints(converter: &Converter, detected: &DetectedConfig) -> (String, String, String) {
    match converter.modify_mode() {
        ModifyMode::Template { server, host, sni } => (
            expand_template(server, converter, detected),
            expand_template(host, converter, detected),
            expand_template(sni, converter, detected),
        ),
        ModifyMode::Legacy(ModifyType::Wildcard) => {
            let derived = format!("{}.{}", converter.bug_host, detected.server);
            (converter.bug_host.clone(), derived.clone(), derived)
        }
        ModifyMode::Legacy(ModifyType::Sni) => (
            detected.server.clone(),
            detected.host.clone(),
            converter.bug_host.clone(),
        ),
        ModifyMode::Legacy(ModifyType::Ws) | ModifyMode::Legacy(ModifyType::Grpc) => (
            converter.bug_host.clone(),
            detected.host.clone(),
            detected.sni.clone(),
        ),
        ModifyMode::Legacy(ModifyType::Custom) => {
            (String::new(), String::new(), String::new())
        }
    }
}

/// 模板占位符替换，空模板返回空串
fn expand_template(template: &str, converter: &Converter, detected: &DetectedConfig) -> String {
    if template.is_empty() {
        return String::new();
    }
    // {bug_ip} 目前等同 {bug_host}，尚未接入 DNS 解析
    template
        .replace("{bug_host}", &converter.bug_host)
        .replace("{bug_ip}", &converter.bug_host)
        .replace("{original_server}", &detected.server)
        .replace("{original_host}", &detected.host)
        .replace("{original_sni}", &detected.sni)
}

/// path 模板的生效条件：网络与修改方式双重门控
fn path_template_applies(converter: &Converter, network: &str) -> bool {
    if converter.path_template.is_empty() {
        return false;
    }
    let network_ok = matches!(network, "ws" | "httpupgrade" | "h2");
    let modify_ok = matches!(converter.modify_type, ModifyType::Ws | ModifyType::Grpc);
    network_ok && modify_ok
}
