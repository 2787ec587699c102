use nfp_core::{Limits, NftError, Result};
use nfp_nl::Attributes;

/// Optional object name, bounded by `limits`.
pub(crate) fn name(
    attrs: &Attributes,
    kind: u16,
    limits: &Limits,
    what: &str,
) -> Result<Option<String>> {
    let Some(name) = attrs.string(kind)? else {
        return Ok(None);
    };
    if name.is_empty() {
        return Err(NftError::invalid(format!("empty {} name", what)));
    }
    if name.len() > limits.max_name_len {
        return Err(NftError::invalid(format!(
            "{} name longer than {} bytes",
            what, limits.max_name_len
        )));
    }
    Ok(Some(name.to_string()))
}

/// Name that must be present; absence is malformed input.
pub(crate) fn required_name(
    attrs: &Attributes,
    kind: u16,
    limits: &Limits,
    what: &str,
) -> Result<String> {
    name(attrs, kind, limits, what)?
        .ok_or_else(|| NftError::invalid(format!("missing {} name", what)))
}

pub(crate) fn userdata(attrs: &Attributes, kind: u16, limits: &Limits) -> Result<Option<Vec<u8>>> {
    match attrs.bytes(kind) {
        Some(data) if data.len() > limits.max_userdata_len => Err(NftError::invalid(format!(
            "userdata longer than {} bytes",
            limits.max_userdata_len
        ))),
        Some(data) => Ok(Some(data.to_vec())),
        None => Ok(None),
    }
}
