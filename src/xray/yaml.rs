//! Clash/OpenClash 代理配置块生成

use crate::converter::Converter;

use super::types::{DetectedConfig, Protocol, RawConfig};

/// 生成单节点的 proxies YAML 配置块
///
/// 空值字段一律省略，不输出空白值。节点名使用检测端口，
/// 端口字段本身则采用覆盖后的值。
pub fn generate_yaml_config(
    detected: &DetectedConfig,
    modified: &RawConfig,
    converter: &Converter,
    effective_path: &str,
) -> String {
    let mut yaml = String::new();

    let proxy_name = format!(
        "{}-{}-{}",
        converter.display_name, detected.protocol, detected.port
    );

    yaml.push_str("proxies:\n");
    yaml.push_str(&format!("  - name: \"{}\"\n", proxy_name));
    yaml.push_str(&format!("    type: {}\n", detected.protocol));

    // 服务器与端口
    let server_key = modified.server_key();
    if let Some(server) = modified.get_str(server_key) {
        if !server.is_empty() {
            yaml.push_str(&format!("    server: {}\n", server));
        }
    }
    let port = converter.port_override.unwrap_or(detected.port);
    yaml.push_str(&format!("    port: {}\n", port));

    // 协议专属字段
    match detected.protocol {
        Protocol::Vmess => {
            if !detected.identifier.is_empty() {
                yaml.push_str(&format!("    uuid: {}\n", detected.identifier));
            }
            yaml.push_str(&format!("    alterId: {}\n", detected.alter_id));
            yaml.push_str("    cipher: auto\n");
        }
        Protocol::Vless => {
            if !detected.identifier.is_empty() {
                yaml.push_str(&format!("    uuid: {}\n", detected.identifier));
            }
        }
        Protocol::Trojan | Protocol::Shadowsocks => {
            if !detected.identifier.is_empty() {
                yaml.push_str(&format!("    password: {}\n", detected.identifier));
            }
            if detected.protocol == Protocol::Shadowsocks {
                if let Some(cipher) = modified.get_str("cipher") {
                    if !cipher.is_empty() {
                        yaml.push_str(&format!("    cipher: {}\n", cipher));
                    }
                }
            }
        }
    }

    yaml.push_str(&format!("    network: {}\n", detected.network));

    // TLS 配置
    if detected.tls {
        yaml.push_str("    tls: true\n");
        if let Some(sni) = modified.get_str("sni") {
            if !sni.is_empty() {
                yaml.push_str(&format!("    servername: {}\n", sni));
            }
        }
        yaml.push_str("    skip-cert-verify: true\n");
    } else {
        yaml.push_str("    tls: false\n");
    }

    // 传输层专属选项
    match detected.network.as_str() {
        "ws" => {
            yaml.push_str("    ws-opts:\n");
            if !effective_path.is_empty() {
                yaml.push_str(&format!("      path: {}\n", effective_path));
            }
            push_host_headers(&mut yaml, modified);
        }
        "grpc" => {
            yaml.push_str("    grpc-opts:\n");
            let service_name = if effective_path.is_empty() {
                "grpc-service"
            } else {
                effective_path
            };
            yaml.push_str(&format!("      grpc-service-name: \"{}\"\n", service_name));
        }
        "httpupgrade" => {
            yaml.push_str("    httpupgrade-opts:\n");
            if !effective_path.is_empty() {
                yaml.push_str(&format!("      path: {}\n", effective_path));
            }
            push_host_headers(&mut yaml, modified);
        }
        _ => {}
    }

    yaml
}

/// ws/httpupgrade 的 Host 伪装头
fn push_host_headers(yaml: &mut String, modified: &RawConfig) {
    if let Some(host) = modified.get_str("host") {
        if !host.is_empty() {
            yaml.push_str("      headers:\n");
            yaml.push_str(&format!("        Host: {}\n", host));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ModifyType;
    use crate::xray::detect::detect;
    use crate::xray::modify::modify;

    fn create_test_converter(modify_type: ModifyType, bug_host: &str) -> Converter {
        Converter::new("test", "XL-Test", bug_host, modify_type)
    }

    #[test]
    fn test_yaml_trojan_ws_full_block() {
        let link =
            "trojan://pass123@example.com:443?type=ws&security=tls&sni=sni.example.com&path=%2Fws#MyNode";
        let detected = detect(link).unwrap();
        let converter = create_test_converter(ModifyType::Wildcard, "bug.test");

        let result = modify(&detected, &converter).unwrap();
        let expected = "proxies:
  - name: \"XL-Test-trojan-443\"
    type: trojan
    server: bug.test
    port: 443
    password: pass123
    network: ws
    tls: true
    servername: bug.test.example.com
    skip-cert-verify: true
    ws-opts:
      path: /ws
      headers:
        Host: bug.test.example.com
";
        assert_eq!(result.yaml_config, expected);
    }

    #[test]
    fn test_yaml_grpc_default_service_name() {
        let link = "vless://uuid-1@example.com:443?type=grpc&security=tls&sni=sni.example.com#G";
        let detected = detect(link).unwrap();
        let converter = create_test_converter(ModifyType::Grpc, "bug.test");

        let result = modify(&detected, &converter).unwrap();
        assert!(result.yaml_config.contains("grpc-opts:\n"));
        assert!(
            result
                .yaml_config
                .contains("grpc-service-name: \"grpc-service\"")
        );
    }

    #[test]
    fn test_yaml_ss_type_and_cipher() {
        let link = "ss://cGFzc3dvcmQ@example.com:8388?cipher=aes-128-gcm#SS";
        let detected = detect(link).unwrap();
        let converter = create_test_converter(ModifyType::Sni, "bug.test");

        let result = modify(&detected, &converter).unwrap();
        assert!(result.yaml_config.contains("type: ss\n"));
        assert!(result.yaml_config.contains("password: cGFzc3dvcmQ\n"));
        assert!(result.yaml_config.contains("cipher: aes-128-gcm\n"));
        assert!(result.yaml_config.contains("XL-Test-ss-8388"));
    }

    #[test]
    fn test_yaml_vmess_protocol_fields() {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;

        let payload = serde_json::json!({
            "add": "example.com",
            "port": "443",
            "id": "uuid-1",
            "aid": "2",
            "net": "ws",
            "tls": "tls",
            "host": "cdn.example.com",
            "path": "/ws"
        });
        let link = format!("vmess://{}", STANDARD.encode(payload.to_string()));
        let detected = detect(&link).unwrap();
        let converter = create_test_converter(ModifyType::Wildcard, "bug.test");

        let result = modify(&detected, &converter).unwrap();
        assert!(result.yaml_config.contains("uuid: uuid-1\n"));
        assert!(result.yaml_config.contains("alterId: 2\n"));
        assert!(result.yaml_config.contains("cipher: auto\n"));
    }

    #[test]
    fn test_yaml_no_tls_block() {
        let link = "vless://uuid-1@example.com:80?type=ws#Plain";
        let detected = detect(link).unwrap();
        let converter = create_test_converter(ModifyType::Ws, "bug.test");

        let result = modify(&detected, &converter).unwrap();
        assert!(result.yaml_config.contains("tls: false\n"));
        assert!(!result.yaml_config.contains("servername"));
        assert!(!result.yaml_config.contains("skip-cert-verify"));
    }

    #[test]
    fn test_yaml_httpupgrade_opts() {
        let link =
            "vless://uuid-1@example.com:443?type=httpupgrade&security=tls&path=%2Fup&host=cdn.example.com#Up";
        let detected = detect(link).unwrap();
        let converter = create_test_converter(ModifyType::Sni, "bug.test");

        let result = modify(&detected, &converter).unwrap();
        assert!(result.yaml_config.contains("httpupgrade-opts:\n"));
        assert!(result.yaml_config.contains("path: /up\n"));
        assert!(result.yaml_config.contains("Host: cdn.example.com\n"));
    }
}
