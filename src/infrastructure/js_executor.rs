//! JS 执行器 - 基础设施层
//!
//! 持有一个 page 资源，只暴露"执行 JS"的能力

use anyhow::Result;
use chromiumoxide::js::EvaluationResult;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// JS 执行器
///
/// 职责：
/// - 持有单个 Page 资源（即驱动层的页面句柄）
/// - 暴露 eval() 能力
/// - 不认识条目 / 目录
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 交还 page（用于关闭）
    pub fn into_page(self) -> Page {
        self.page
    }

    /// 执行 JS 代码并返回 JSON 结果（脚本结果为 undefined 时返回 Null）
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        result_to_json(result)
    }

    /// 只执行，不关心返回值（滚动等操作）
    pub async fn exec(&self, js_code: impl Into<String>) -> Result<()> {
        self.page.evaluate(js_code.into()).await?;
        Ok(())
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }
}

/// CDP 对 undefined 不返回 value 字段，into_value 会直接报错
fn result_to_json(result: EvaluationResult) -> Result<JsonValue> {
    if result.value().is_none() {
        return Ok(JsonValue::Null);
    }
    Ok(result.into_value()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromiumoxide::cdp::js_protocol::runtime::RemoteObject;
    use serde_json::json;

    fn evaluation(raw: JsonValue) -> EvaluationResult {
        let object: RemoteObject = serde_json::from_value(raw).unwrap();
        EvaluationResult::new(object)
    }

    #[test]
    fn test_undefined_result_is_null() {
        let result = evaluation(json!({ "type": "undefined" }));
        assert_eq!(result_to_json(result).unwrap(), JsonValue::Null);
    }

    #[test]
    fn test_value_result_passes_through() {
        let result = evaluation(json!({ "type": "boolean", "value": true }));
        assert_eq!(result_to_json(result).unwrap(), json!(true));
    }
}
