use serde::Serialize;

use crate::error::PharmyrusError;

pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, PharmyrusError> {
    Ok(serde_json::to_string_pretty(value)?)
}
