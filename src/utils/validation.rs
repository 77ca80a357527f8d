use crate::utils::error::{ProviderError, Result};
use std::fmt::Display;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(ProviderError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ProviderError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(ProviderError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(ProviderError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ProviderError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_one_of<T: PartialEq + Display>(field_name: &str, value: &T, allowed: &[T]) -> Result<()> {
    if allowed.contains(value) {
        return Ok(());
    }
    let allowed_list: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
    Err(ProviderError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: format!("Value must be one of: {}", allowed_list.join(", ")),
    })
}

/// 驗證自動擴展的 CU 上下限
pub fn validate_cu_range(field_prefix: &str, min: Option<f64>, max: Option<f64>) -> Result<()> {
    for (suffix, value) in [("min_cu", min), ("max_cu", max)] {
        if let Some(value) = value {
            if value <= 0.0 {
                return Err(ProviderError::InvalidConfigValueError {
                    field: format!("{}_{}", field_prefix, suffix),
                    value: value.to_string(),
                    reason: "Compute units must be greater than 0".to_string(),
                });
            }
        }
    }

    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ProviderError::InvalidConfigValueError {
                field: format!("{}_min_cu", field_prefix),
                value: min.to_string(),
                reason: format!("Minimum must not exceed maximum ({})", max),
            });
        }
    }
    Ok(())
}
