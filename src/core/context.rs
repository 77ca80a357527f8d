use crate::domain::model::ResourceAddress;
use crate::utils::error::{ProviderError, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

const REFERENCE_PATTERN: &str = r"\{\{\s*([^{}]+?)\s*\}\}";

/// 套用過程中累積的狀態，供後續資源以 `{{kind.name.path}}` 引用
#[derive(Debug, Clone, Default)]
pub struct ApplyContext {
    values: HashMap<String, Value>,
}

impl ApplyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_resource(&mut self, address: &ResourceAddress, state: Value) {
        self.values.insert(address.to_string(), state);
    }

    pub fn insert_data(&mut self, address: &ResourceAddress, state: Value) {
        self.values.insert(format!("data.{}", address), state);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 遞迴解析屬性中的所有引用
    pub fn resolve(&self, owner: &str, value: &Value) -> Result<Value> {
        let re = Regex::new(REFERENCE_PATTERN).map_err(|e| ProviderError::config(e.to_string()))?;
        self.resolve_with(&re, owner, value)
    }

    fn resolve_with(&self, re: &Regex, owner: &str, value: &Value) -> Result<Value> {
        match value {
            Value::String(text) => self.resolve_string(re, owner, text),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_with(re, owner, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    resolved.insert(key.clone(), self.resolve_with(re, owner, item)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, re: &Regex, owner: &str, text: &str) -> Result<Value> {
        // 整個字串只有一個引用時保留原始 JSON 型別
        if let Some(caps) = re.captures(text) {
            if let Some(whole) = caps.get(0) {
                if whole.start() == 0 && whole.end() == text.len() {
                    return self.lookup(owner, &caps[1]).cloned();
                }
            }
        }

        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            output.push_str(&text[last..whole.start()]);
            match self.lookup(owner, &caps[1])? {
                Value::String(s) => output.push_str(s),
                other => output.push_str(&other.to_string()),
            }
            last = whole.end();
        }
        output.push_str(&text[last..]);

        Ok(Value::String(output))
    }

    fn lookup(&self, owner: &str, reference: &str) -> Result<&Value> {
        let unresolved = || ProviderError::ReferenceError {
            address: owner.to_string(),
            reference: reference.to_string(),
        };

        let segments: Vec<&str> = reference.split('.').collect();
        let key_len = if segments.first() == Some(&"data") { 3 } else { 2 };
        if segments.len() <= key_len {
            return Err(unresolved());
        }

        let key = segments[..key_len].join(".");
        let mut current = self.values.get(&key).ok_or_else(unresolved)?;
        for segment in &segments[key_len..] {
            current = match current {
                Value::Object(map) => map.get(*segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(unresolved)?;
        }

        if current.is_null() {
            return Err(unresolved());
        }
        Ok(current)
    }
}
