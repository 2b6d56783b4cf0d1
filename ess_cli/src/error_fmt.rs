//! Human-readable error descriptions and structured JSON error formatting.

use std::fmt;

/// Context marker attached to every configuration failure; selects exit code 2.
#[derive(Debug, Clone, Copy)]
pub struct InvalidConfiguration;

impl fmt::Display for InvalidConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid configuration")
    }
}

fn root_message(err: &eyre::Report) -> String {
    err.chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use ess_core::error::{BuildError, LinkError};
    use ess_hardware::error::HwError;

    let detail = root_message(err);

    if err.downcast_ref::<InvalidConfiguration>().is_some() {
        return format!(
            "What happened: {detail}.\nLikely causes: A value in the config file, the .env file or the environment is missing, malformed or out of range.\nHow to fix: Correct the named key, then run `ess check` to verify."
        );
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLink => {
                "What happened: No register link was provided to the control loop.\nLikely causes: The Modbus or simulated link failed to initialize.\nHow to fix: Check the link settings or run with --sim.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid runtime configuration ({msg}).\nLikely causes: Out-of-range values after unit conversion.\nHow to fix: Adjust the configuration and rerun `ess check`."
            ),
        };
    }

    if let Some(le) = err.downcast_ref::<LinkError>() {
        return match le {
            LinkError::Timeout => "What happened: The GX device did not answer in time.\nLikely causes: Wrong VENUS_IP/VENUS_PORT, Modbus/TCP disabled on the GX, or a network problem.\nHow to fix: Enable Modbus/TCP in the GX settings, verify the address, or raise MODBUS_TIMEOUT_S.".to_string(),
            LinkError::Exception(msg) => format!(
                "What happened: The device rejected the request ({msg}).\nLikely causes: Wrong unit id or register address, or ADDR_OFFSET set when it should not be.\nHow to fix: Check READ_UNIT_ID/MODE_UNIT_ID/ESS_UNIT_ID and the REG_* values against the GX register list."
            ),
            other => format!(
                "What happened: Link failure ({other}).\nLikely causes: Network interruption or device restart.\nHow to fix: Check connectivity to the GX device and rerun."
            ),
        };
    }

    if let Some(HwError::Resolve(addr) | HwError::Connect { addr, .. }) = err.downcast_ref::<HwError>()
    {
        return format!(
            "What happened: Could not reach {addr}.\nLikely causes: Wrong host/port or the GX device is offline.\nHow to fix: Verify VENUS_IP and VENUS_PORT."
        );
    }

    let lower = detail.to_ascii_lowercase();
    if lower.contains("modbus support") {
        return format!(
            "What happened: {detail}.\nLikely causes: The binary was built without the `modbus` feature.\nHow to fix: Rebuild with default features or pass --sim."
        );
    }

    format!(
        "Something went wrong: {detail}\nHow to fix: Re-run with --log-level=debug for details."
    )
}

/// Stable exit codes: 2 for configuration errors, 1 for anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> u8 {
    if err.downcast_ref::<InvalidConfiguration>().is_some() {
        return 2;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    use ess_core::error::{BuildError, LinkError};
    if err.downcast_ref::<InvalidConfiguration>().is_some() {
        "InvalidConfiguration"
    } else if err.downcast_ref::<BuildError>().is_some() {
        "Build"
    } else if err.downcast_ref::<LinkError>().is_some() {
        "Link"
    } else {
        "Error"
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    json!({
        "reason": reason_name(err),
        "error": root_message(err),
        "message": humanize(err),
    })
    .to_string()
}
