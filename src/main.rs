use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use audit::{AuditLog, FileAuditLog, MemoryAuditLog};
use config::AppConfig;
use converter::{ConverterStore, FileConverterStore, MemoryConverterStore, seed_defaults};
use service::ConversionService;

mod audit;
mod config;
mod converter;
mod service;
mod xray;

/// XRay 链接转换工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 待转换的 XRay 链接（vmess/vless/trojan/ss）
    link: Option<String>,

    /// 转换器命令名
    #[arg(short = 'c', long)]
    converter: Option<String>,

    /// 配置文件路径
    #[arg(short = 'f', long, default_value = "config/config.yaml")]
    config: String,

    /// 输出目录（覆盖配置文件设置）
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// 列出全部转换器
    #[arg(long)]
    list: bool,

    /// 显示近 N 天的使用统计（省略天数时取配置 stats_days）
    #[arg(long)]
    stats: Option<Option<u32>>,

    /// 显示最近 N 条转换记录
    #[arg(long)]
    recent: Option<usize>,

    /// 发起者标识
    #[arg(long)]
    caller: Option<String>,

    /// 会话标识
    #[arg(long)]
    context: Option<String>,

    /// 生成默认配置文件后退出
    #[arg(long)]
    init_config: bool,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 详细输出
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    println!("🚀 XRay 链接转换工具 v{}", env!("CARGO_PKG_VERSION"));
    println!("{:=<80}", "");

    // 生成默认配置文件
    if args.init_config {
        let config = AppConfig::default();
        config.save_to_file(&args.config)?;
        println!("✅ 已生成默认配置: {}", args.config);
        return Ok(());
    }

    // 尝试加载配置文件
    let mut config = if Path::new(&args.config).exists() {
        println!("📁 从配置文件加载设置: {}", args.config);
        match AppConfig::load_from_file(&args.config) {
            Ok(config) => {
                println!("✅ 配置文件加载成功");
                config
            }
            Err(e) => {
                println!("⚠️  配置文件加载失败: {}", e);
                println!("📝 使用默认配置");
                AppConfig::default()
            }
        }
    } else {
        println!("📝 使用默认配置 (配置文件不存在: {})", args.config);
        AppConfig::default()
    };

    // 覆盖命令行参数
    if let Some(output) = args.output {
        config.output_dir = output;
    }

    // 设置日志级别（--verbose > 命令行 > 配置文件）
    let log_level = if args.verbose {
        "debug"
    } else if args.log_level != "info" {
        args.log_level.as_str()
    } else {
        config.log_level.as_str()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // 初始化转换器存储与审计日志（converters_file 为空时退化为内存存储）
    let store: Arc<dyn ConverterStore> = if config.converters_file.is_empty() {
        Arc::new(MemoryConverterStore::new())
    } else {
        Arc::new(FileConverterStore::open(&config.converters_file)?)
    };
    if config.seed_default_converters {
        seed_defaults(store.as_ref())?;
    }
    let audit: Arc<dyn AuditLog> = match &config.audit_log_file {
        Some(path) => Arc::new(FileAuditLog::open(path)?),
        None => Arc::new(MemoryAuditLog::new()),
    };
    if !config.is_audit_enabled() {
        println!("⚠️  审计日志未启用，转换记录仅保存在内存中");
    }
    let service = ConversionService::new(store, audit);

    // 列表 / 统计 / 最近记录
    if args.list {
        print_converters(&service)?;
        return Ok(());
    }
    if let Some(days) = args.stats {
        print_stats(&service, days.unwrap_or(config.stats_days))?;
        return Ok(());
    }
    if let Some(limit) = args.recent {
        print_recent(&service, limit)?;
        return Ok(());
    }

    // 执行转换
    let (link, converter_name) = match (args.link, args.converter) {
        (Some(link), Some(converter)) => (link, converter),
        _ => {
            println!("⚠️  请提供链接与 --converter 转换器名");
            println!("    或使用 --list / --stats / --recent N / --init-config");
            return Ok(());
        }
    };

    let caller = args.caller.unwrap_or_else(|| config.default_caller_id.clone());
    let context = args
        .context
        .unwrap_or_else(|| config.default_context_id.clone());

    println!("\n🔍 检测并转换链接...");
    let result = service.convert(&converter_name, &link, &caller, &context)?;
    let detected = &result.detected;

    println!("\n📡 检测结果:");
    println!("  协议: {}", detected.protocol);
    println!(
        "  格式: {}",
        if detected.raw.is_json() { "base64-JSON" } else { "URL" }
    );
    println!("  服务器: {}", detected.get_address());
    println!(
        "  传输: {} / TLS: {}",
        detected.network,
        if detected.tls { "✅" } else { "❌" }
    );
    if !detected.service_name.is_empty() {
        println!("  gRPC 服务名: {}", detected.service_name);
    }
    if !detected.header_type.is_empty() {
        println!("  伪装头类型: {}", detected.header_type);
    }
    if !detected.remarks.is_empty() {
        println!("  备注: {}", detected.remarks);
    }

    println!(
        "\n🔧 修改详情 ({} / 伪装域名 {}):",
        result.modify_type, result.bug_host
    );
    println!(
        "  服务器: {} -> {}",
        detected.server,
        or_dash(&result.modified_server)
    );
    println!(
        "  Host:   {} -> {}",
        or_dash(&detected.host),
        or_dash(&result.modified_host)
    );
    println!(
        "  SNI:    {} -> {}",
        or_dash(&detected.sni),
        or_dash(&result.modified_sni)
    );

    println!("\n🔗 转换后链接:");
    println!("{}", result.modified_link);

    println!("\n📄 Clash 配置:");
    println!("{}", result.yaml_config);

    // 保存 YAML 配置文件
    if config.write_yaml_file && !config.output_dir.is_empty() {
        fs::create_dir_all(&config.output_dir)?;
        let file_name = format!("{}-{}.yaml", converter_name, detected.protocol);
        let out_path = Path::new(&config.output_dir).join(file_name);
        fs::write(&out_path, &result.yaml_config)?;
        println!("💾 YAML 已保存: {}", out_path.display());
    }

    println!("\n🎉 转换完成!");

    Ok(())
}

fn print_converters(service: &ConversionService) -> Result<()> {
    let converters = service.list_converters()?;
    if converters.is_empty() {
        println!("📝 暂无转换器，可在配置中开启 seed_default_converters 写入预设");
        return Ok(());
    }

    println!("\n📋 转换器列表 ({} 个):", converters.len());
    println!("{:-<80}", "");
    for converter in &converters {
        println!(
            "  {} {} ({})",
            if converter.is_active { "✅" } else { "⛔" },
            converter.name,
            converter.display_name
        );
        println!(
            "     伪装域名: {} / 方式: {} / 已用 {} 次",
            converter.bug_host, converter.modify_type, converter.usage_count
        );
        if !converter.server_template.is_empty()
            || !converter.host_template.is_empty()
            || !converter.sni_template.is_empty()
        {
            println!(
                "     模板: server={} host={} sni={}",
                or_dash(&converter.server_template),
                or_dash(&converter.host_template),
                or_dash(&converter.sni_template)
            );
        }
        if !converter.path_template.is_empty() {
            println!("     path 模板: {}", converter.path_template);
        }
        if let Some(port) = converter.port_override {
            println!("     端口覆盖: {}", port);
        }
    }
    let active = service.active_converters()?.len();
    println!("{:-<80}", "");
    println!("  启用 {} / 共 {} 个", active, converters.len());
    Ok(())
}

fn print_stats(service: &ConversionService, days: u32) -> Result<()> {
    let stats = service.usage_stats(days)?;
    println!("\n📊 近 {} 天转换统计:", days);
    println!("{:-<80}", "");
    if stats.is_empty() {
        println!("  暂无成功转换记录");
        return Ok(());
    }
    for (name, count) in &stats {
        println!("  {}: {} 次", name, count);
    }
    Ok(())
}

fn print_recent(service: &ConversionService, limit: usize) -> Result<()> {
    let records = service.recent_records(limit)?;
    println!("\n🕘 最近 {} 条转换记录:", limit);
    println!("{:-<80}", "");
    if records.is_empty() {
        println!("  暂无记录");
        return Ok(());
    }
    for record in &records {
        println!(
            "  [{}] {} {} {} -> {}",
            record.used_at.format("%Y-%m-%d %H:%M:%S"),
            if record.success { "✅" } else { "❌" },
            record.converter_name,
            or_dash(&record.original_server),
            or_dash(&record.modified_server)
        );
        if let Some(error) = &record.error_message {
            println!("      原因: {}", error);
        }
    }
    Ok(())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
