use crate::domain::model::PlannedAction;
use serde_json::Value;

/// 比對期望屬性與目前狀態，回傳有差異的頂層屬性名稱
///
/// 只比對 `desired` 裡出現的鍵；`ignore` 中的鍵一律略過。
pub fn diff_attributes(desired: &Value, current: &Value, ignore: &[&str]) -> Vec<String> {
    let Some(desired) = desired.as_object() else {
        return Vec::new();
    };

    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, _)| !ignore.contains(&key.as_str()))
        .filter(|(key, want)| !values_equal(want, current.get(key.as_str()).unwrap_or(&Value::Null)))
        .map(|(key, _)| key.clone())
        .collect();
    changed.sort();
    changed
}

/// 任何一個變更屬性屬於 replace-on-change 就必須重建
pub fn plan_action(changed: Vec<String>, replace_on_change: &[&str]) -> PlannedAction {
    if changed.is_empty() {
        PlannedAction::NoOp
    } else if changed.iter().any(|key| replace_on_change.contains(&key.as_str())) {
        PlannedAction::Replace { changed }
    } else {
        PlannedAction::Update { changed }
    }
}

fn values_equal(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        // 物件只比對期望中出現的鍵，遠端多出來的欄位不算差異
        (Value::Object(a), Value::Object(b)) => a
            .iter()
            .all(|(key, x)| values_equal(x, b.get(key).unwrap_or(&Value::Null))),
        _ => want == have,
    }
}
