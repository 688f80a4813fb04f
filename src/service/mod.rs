//! 转换流程编排
//!
//! 串联转换器查找、链接检测、配置修改、审计记录与使用计数。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audit::{AuditLog, ConversionRecord};
use crate::converter::{Converter, ConverterStore};
use crate::xray::{self, ModifiedConfig, XrayError};

/// 转换服务
pub struct ConversionService {
    store: Arc<dyn ConverterStore>,
    audit: Arc<dyn AuditLog>,
}

impl ConversionService {
    pub fn new(store: Arc<dyn ConverterStore>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, audit }
    }

    /// 执行一次完整转换
    ///
    /// 每次调用恰好落一条审计记录，成功失败都计入；审计写入与
    /// 使用计数失败只降级为警告，不影响转换结果。
    pub fn convert(
        &self,
        converter_name: &str,
        link: &str,
        caller_id: &str,
        context_id: &str,
    ) -> Result<ModifiedConfig, XrayError> {
        // 1. 查找转换器
        let converter = match self.store.get(converter_name) {
            Ok(Some(converter)) => converter,
            Ok(None) => {
                let err = XrayError::ConverterNotFound(converter_name.to_string());
                self.record_unknown_failure(converter_name, caller_id, context_id, &err);
                return Err(err);
            }
            Err(e) => {
                let err = XrayError::Registry(e.to_string());
                self.record_unknown_failure(converter_name, caller_id, context_id, &err);
                return Err(err);
            }
        };

        // 2. 启用检查，未启用不进入检测
        if !converter.is_active {
            let err = XrayError::ConverterInactive(converter_name.to_string());
            self.record_unknown_failure(converter_name, caller_id, context_id, &err);
            return Err(err);
        }

        // 3. 检测链接
        let detected = match xray::detect(link) {
            Ok(detected) => detected,
            Err(err) => {
                self.record_unknown_failure(converter_name, caller_id, context_id, &err);
                return Err(err);
            }
        };

        // 4. 修改配置，失败记录带上已检测出的字段
        let result = match xray::modify(&detected, &converter) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("转换失败 [{}]: {}", err.kind(), err);
                self.record_entry(ConversionRecord::failure(
                    converter_name,
                    caller_id,
                    context_id,
                    detected.protocol.as_str(),
                    &detected.network,
                    &detected.server,
                    err.to_string(),
                ));
                return Err(err);
            }
        };

        // 5. 成功记录与使用计数
        self.record_entry(ConversionRecord::success(
            converter_name,
            caller_id,
            context_id,
            detected.protocol.as_str(),
            &detected.network,
            &detected.server,
            &result.modified_server,
        ));
        if let Err(e) = self.store.increment_usage(converter_name) {
            log::warn!("使用计数更新失败: {}", e);
        }

        log::info!(
            "转换成功: {} -> {} ({})",
            detected.server,
            result.modified_server,
            converter.modify_type
        );

        Ok(result)
    }

    /// 全部转换器
    pub fn list_converters(&self) -> Result<Vec<Converter>, XrayError> {
        self.store
            .list()
            .map_err(|e| XrayError::Registry(e.to_string()))
    }

    /// 启用中的转换器
    pub fn active_converters(&self) -> Result<Vec<Converter>, XrayError> {
        self.store
            .list_active()
            .map_err(|e| XrayError::Registry(e.to_string()))
    }

    /// 近 N 天各转换器的成功次数
    pub fn usage_stats(&self, days: u32) -> Result<BTreeMap<String, u64>, XrayError> {
        self.audit
            .usage_stats(days)
            .map_err(|e| XrayError::Registry(e.to_string()))
    }

    /// 最近的转换记录，新的在前
    pub fn recent_records(&self, limit: usize) -> Result<Vec<ConversionRecord>, XrayError> {
        self.audit
            .recent(limit)
            .map_err(|e| XrayError::Registry(e.to_string()))
    }

    fn record_unknown_failure(
        &self,
        converter_name: &str,
        caller_id: &str,
        context_id: &str,
        err: &XrayError,
    ) {
        log::warn!("转换失败 [{}]: {}", err.kind(), err);
        self.record_entry(ConversionRecord::failure(
            converter_name,
            caller_id,
            context_id,
            "unknown",
            "",
            "",
            err.to_string(),
        ));
    }

    fn record_entry(&self, entry: ConversionRecord) {
        if let Err(e) = self.audit.record(&entry) {
            log::warn!("审计记录写入失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::converter::{MemoryConverterStore, ModifyType};

    const TROJAN_LINK: &str =
        "trojan://pass123@example.com:443?type=ws&security=tls&sni=sni.example.com&path=%2Fws#MyNode";

    fn create_test_service() -> (
        Arc<MemoryConverterStore>,
        Arc<MemoryAuditLog>,
        ConversionService,
    ) {
        let store = Arc::new(MemoryConverterStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let service = ConversionService::new(store.clone(), audit.clone());
        (store, audit, service)
    }

    #[test]
    fn test_convert_success_flow() {
        let (store, audit, service) = create_test_service();
        store
            .create(&Converter::new(
                "bizz",
                "XL-Test",
                "bug.test",
                ModifyType::Wildcard,
            ))
            .unwrap();

        let result = service
            .convert("bizz", TROJAN_LINK, "user-1", "group-1")
            .unwrap();

        assert_eq!(result.modified_server, "bug.test");

        // 恰好一条成功记录
        let records = audit.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].converter_name, "bizz");
        assert_eq!(records[0].protocol, "trojan");
        assert_eq!(records[0].network, "ws");
        assert_eq!(records[0].original_server, "example.com");
        assert_eq!(records[0].modified_server, "bug.test");

        // 使用计数加一
        assert_eq!(store.get("bizz").unwrap().unwrap().usage_count, 1);
    }

    #[test]
    fn test_convert_converter_not_found() {
        let (store, audit, service) = create_test_service();

        let err = service
            .convert("missing", TROJAN_LINK, "user-1", "group-1")
            .unwrap_err();
        assert!(matches!(err, XrayError::ConverterNotFound(_)));

        let records = audit.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].protocol, "unknown");
        assert!(records[0].error_message.is_some());
        assert_eq!(store.list().unwrap().len(), 0);
    }

    #[test]
    fn test_convert_inactive_short_circuits() {
        let (store, audit, service) = create_test_service();
        store
            .create(
                &Converter::new("off", "Off", "bug.test", ModifyType::Wildcard)
                    .with_active(false),
            )
            .unwrap();

        let err = service
            .convert("off", TROJAN_LINK, "user-1", "group-1")
            .unwrap_err();
        assert!(matches!(err, XrayError::ConverterInactive(_)));

        // 不进入检测与修改，但仍有恰好一条失败记录
        let records = audit.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].protocol, "unknown");
        assert_eq!(records[0].original_server, "");

        // 使用计数不变
        assert_eq!(store.get("off").unwrap().unwrap().usage_count, 0);
    }

    #[test]
    fn test_convert_detect_failure_logged_unknown() {
        let (store, audit, service) = create_test_service();
        store
            .create(&Converter::new(
                "bizz",
                "XL-Test",
                "bug.test",
                ModifyType::Wildcard,
            ))
            .unwrap();

        let err = service
            .convert("bizz", "ss5://bad@example.com:443", "user-1", "group-1")
            .unwrap_err();
        assert!(matches!(err, XrayError::UnsupportedScheme(_)));

        let records = audit.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].protocol, "unknown");
        assert_eq!(store.get("bizz").unwrap().unwrap().usage_count, 0);
    }

    #[test]
    fn test_convert_modify_failure_keeps_detected_fields() {
        let (store, audit, service) = create_test_service();
        store
            .create(&Converter::new(
                "bizz",
                "XL-Test",
                "bug.test",
                ModifyType::Wildcard,
            ))
            .unwrap();

        // 无 identifier 的链接检测可过，但重新生成缺必备字段
        let err = service
            .convert(
                "bizz",
                "trojan://@example.com:443?security=tls#NoPass",
                "user-1",
                "group-1",
            )
            .unwrap_err();
        assert!(matches!(err, XrayError::LinkGenerationUnsupported(_)));

        let records = audit.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].protocol, "trojan");
        assert_eq!(records[0].original_server, "example.com");
        assert_eq!(records[0].modified_server, "");
    }

    #[test]
    fn test_convert_one_record_per_attempt() {
        let (store, audit, service) = create_test_service();
        store
            .create(&Converter::new(
                "bizz",
                "XL-Test",
                "bug.test",
                ModifyType::Wildcard,
            ))
            .unwrap();

        let _ = service.convert("bizz", TROJAN_LINK, "u", "g");
        let _ = service.convert("missing", TROJAN_LINK, "u", "g");
        let _ = service.convert("bizz", "garbage", "u", "g");

        assert_eq!(audit.len(), 3);
    }
}
