#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema, sources, and validation for the ESS battery guard.
//!
//! - `Config` and its sections deserialize from TOML; every field has a default.
//! - Environment variables (optionally seeded from a `.env` file) override the
//!   TOML values using the operator-facing names (`SOC_MIN`, `PV_REGS`, ...).
//! - `validate()` rejects anything the control loop could not run with.
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable that points at an alternative `.env` file.
pub const ENV_FILE_VAR: &str = "ESS_ACCU_OFF_ENV_FILE";

/// Upper bound for the shutdown dwell and the write gaps, in seconds.
pub const MAX_DELAY_S: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Link {
    /// Modbus TCP host (GX device)
    pub host: String,
    pub port: u16,
    /// Per-request timeout in whole seconds
    pub timeout_s: u64,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            host: "192.168.41.101".to_string(),
            port: 502,
            timeout_s: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Units {
    /// Unit id for the measurement registers (system service)
    pub read: u8,
    /// Unit id of the VE.Bus device that owns the mode register
    pub mode: u8,
    /// Unit id that owns the ESS output-mode register
    pub output: u8,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            read: 100,
            mode: 227,
            output: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Registers {
    pub enable: u16,
    pub soc: u16,
    /// First of three consecutive load registers (L1, L2, L3)
    pub load_base: u16,
    /// PV registers, summed
    pub pv: Vec<u16>,
    pub mode: u16,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            enable: 806,
            soc: 843,
            load_base: 817,
            pv: vec![811, 812, 813],
            mode: 33,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputMode {
    pub register: u16,
    /// Value written during the day (ESS with phase compensation)
    pub day_value: u16,
    /// Value written at night when switching is allowed
    pub night_value: u16,
    /// Only meaningful on three-phase systems
    pub allow_night_switch: bool,
}

impl Default for OutputMode {
    fn default() -> Self {
        Self {
            register: 2902,
            day_value: 1,
            night_value: 2,
            allow_night_switch: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Soc {
    /// Shutdown threshold (percent, inclusive)
    pub min: f64,
    /// Threshold for leaving charger-only (percent, inclusive)
    pub charge_min: f64,
}

impl Default for Soc {
    fn default() -> Self {
        Self {
            min: 39.0,
            charge_min: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Surplus {
    pub margin_w: f64,
    pub confirm_s: f64,
}

impl Default for Surplus {
    fn default() -> Self {
        Self {
            margin_w: 100.0,
            confirm_s: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Night {
    /// PV below this counts towards night
    pub pv_threshold_w: f64,
    pub confirm_s: f64,
    /// Multiplicative decay applied per bright sample, in [0, 1)
    pub decay_factor: f64,
    pub turn_off_below_charge_min: bool,
}

impl Default for Night {
    fn default() -> Self {
        Self {
            pv_threshold_w: 200.0,
            confirm_s: 1800.0,
            decay_factor: 0.25,
            turn_off_below_charge_min: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Shutdown {
    /// Time spent in charger-only before switching off
    pub off_delay_s: f64,
    /// After a low-SOC shutdown, stay off until a night has been seen
    pub require_night_before_restart: bool,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self {
            off_delay_s: 30.0,
            require_night_before_restart: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    pub poll_interval_s: f64,
    pub min_write_gap_s: f64,
    pub min_output_write_gap_s: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval_s: 5.0,
            min_write_gap_s: 5.0,
            min_output_write_gap_s: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scaling {
    pub soc_divisor: f64,
    /// Added to every register address before it goes on the wire
    pub addr_offset: i32,
}

impl Default for Scaling {
    fn default() -> Self {
        Self {
            soc_divisor: 1.0,
            addr_offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    /// path to .log (JSON lines)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// "info","debug"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Compute and log decisions without writing to the device
    pub dry_run: bool,
    pub link: Link,
    pub units: Units,
    pub registers: Registers,
    pub output: OutputMode,
    pub soc: Soc,
    pub surplus: Surplus,
    pub night: Night,
    pub shutdown: Shutdown,
    pub timing: Timing,
    pub scaling: Scaling,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Where to look for configuration besides the process environment.
#[derive(Debug, Default, Clone)]
pub struct Sources {
    /// Optional TOML file; missing file is an error when given.
    pub config_file: Option<PathBuf>,
    /// Optional `.env` file; missing file is an error when given.
    pub env_file: Option<PathBuf>,
}

/// Resolve the full configuration: defaults, TOML file, `.env`, environment, validation.
pub fn load(sources: &Sources) -> eyre::Result<Config> {
    let mut cfg = match &sources.config_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
            load_toml(&text)
                .wrap_err_with(|| format!("failed to parse config file {}", path.display()))?
        }
        None => Config::default(),
    };

    load_env_file(sources.env_file.as_deref())?;
    cfg.apply_env(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

/// Seed the process environment from a `.env` file without overriding set variables.
///
/// An explicit path must exist. Otherwise `ESS_ACCU_OFF_ENV_FILE` or `./.env` is
/// tried and silently skipped when absent.
pub fn load_env_file(explicit: Option<&Path>) -> eyre::Result<()> {
    if let Some(path) = explicit {
        dotenvy::from_path(path)
            .wrap_err_with(|| format!("failed to load env file {}", path.display()))?;
        return Ok(());
    }
    let path = std::env::var_os(ENV_FILE_VAR)
        .filter(|p| !p.is_empty())
        .map_or_else(|| PathBuf::from(".env"), PathBuf::from);
    match dotenvy::from_path(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).wrap_err_with(|| format!("failed to load env file {}", path.display())),
    }
}

/// Parse a boolean the way operators write them in env files.
pub fn parse_bool(key: &str, raw: &str) -> eyre::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        other => eyre::bail!("{key}: expected a boolean (1/0, true/false, yes/no, on/off), got {other:?}"),
    }
}

/// Parse any `FromStr` number, naming the key on failure.
pub fn parse_num<T>(key: &str, raw: &str) -> eyre::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| eyre::eyre!("{key}: invalid number {raw:?}: {e}"))
}

/// Parse a register list separated by `,` or `;` (e.g. "811,812,813").
pub fn parse_register_list(key: &str, raw: &str) -> eyre::Result<Vec<u16>> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| parse_num::<u16>(key, p))
        .collect()
}

fn parse_string(_key: &str, raw: &str) -> eyre::Result<String> {
    Ok(raw.to_string())
}

fn overlay<T, F>(
    lookup: &F,
    key: &str,
    slot: &mut T,
    parse: fn(&str, &str) -> eyre::Result<T>,
) -> eyre::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        let raw = raw.trim();
        // Empty means "unset" so an exported-but-blank variable keeps the default.
        if !raw.is_empty() {
            *slot = parse(key, raw)?;
        }
    }
    Ok(())
}

impl Config {
    /// Override fields from environment-style key/value lookups.
    pub fn apply_env<F>(&mut self, lookup: F) -> eyre::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let l = &lookup;
        overlay(l, "VENUS_IP", &mut self.link.host, parse_string)?;
        overlay(l, "VENUS_PORT", &mut self.link.port, parse_num)?;
        overlay(l, "MODBUS_TIMEOUT_S", &mut self.link.timeout_s, parse_num)?;

        overlay(l, "READ_UNIT_ID", &mut self.units.read, parse_num)?;
        overlay(l, "MODE_UNIT_ID", &mut self.units.mode, parse_num)?;
        overlay(l, "ESS_UNIT_ID", &mut self.units.output, parse_num)?;

        overlay(l, "REG_ENABLE", &mut self.registers.enable, parse_num)?;
        overlay(l, "REG_SOC", &mut self.registers.soc, parse_num)?;
        overlay(l, "REG_LOAD_BASE", &mut self.registers.load_base, parse_num)?;
        overlay(l, "PV_REGS", &mut self.registers.pv, parse_register_list)?;
        overlay(l, "REG_MODE", &mut self.registers.mode, parse_num)?;

        overlay(l, "REG_ESS_MODE", &mut self.output.register, parse_num)?;
        overlay(l, "ESS_DAY_VALUE", &mut self.output.day_value, parse_num)?;
        overlay(l, "ESS_NIGHT_VALUE", &mut self.output.night_value, parse_num)?;
        overlay(
            l,
            "ESS_ALLOW_NIGHT_SWITCH",
            &mut self.output.allow_night_switch,
            parse_bool,
        )?;

        overlay(l, "SOC_MIN", &mut self.soc.min, parse_num)?;
        overlay(l, "SOC_CHARGE_MIN", &mut self.soc.charge_min, parse_num)?;

        overlay(l, "PV_SURPLUS_W", &mut self.surplus.margin_w, parse_num)?;
        overlay(l, "PV_SURPLUS_CONFIRM_S", &mut self.surplus.confirm_s, parse_num)?;

        overlay(l, "PV_NIGHT_W", &mut self.night.pv_threshold_w, parse_num)?;
        overlay(l, "NIGHT_CONFIRM_S", &mut self.night.confirm_s, parse_num)?;
        overlay(l, "NIGHT_DECAY_FACTOR", &mut self.night.decay_factor, parse_num)?;
        overlay(
            l,
            "TURN_OFF_AT_NIGHT_WHEN_BELOW_CHARGE_MIN",
            &mut self.night.turn_off_below_charge_min,
            parse_bool,
        )?;

        overlay(l, "OFF_DELAY_SECONDS", &mut self.shutdown.off_delay_s, parse_num)?;
        overlay(
            l,
            "REQUIRE_NIGHT_BEFORE_RESTART",
            &mut self.shutdown.require_night_before_restart,
            parse_bool,
        )?;

        overlay(l, "POLL_INTERVAL_S", &mut self.timing.poll_interval_s, parse_num)?;
        overlay(l, "MIN_WRITE_GAP_S", &mut self.timing.min_write_gap_s, parse_num)?;
        overlay(
            l,
            "MIN_ESS_WRITE_GAP_S",
            &mut self.timing.min_output_write_gap_s,
            parse_num,
        )?;

        overlay(l, "SOC_DIVISOR", &mut self.scaling.soc_divisor, parse_num)?;
        overlay(l, "ADDR_OFFSET", &mut self.scaling.addr_offset, parse_num)?;
        overlay(l, "DRY_RUN", &mut self.dry_run, parse_bool)?;

        let mut file = self.logging.file.clone().unwrap_or_default();
        overlay(l, "ESS_LOG_FILE", &mut file, parse_string)?;
        if !file.is_empty() {
            self.logging.file = Some(file);
        }
        let mut level = self.logging.level.clone().unwrap_or_default();
        overlay(l, "ESS_LOG_LEVEL", &mut level, parse_string)?;
        if !level.is_empty() {
            self.logging.level = Some(level);
        }
        Ok(())
    }

    /// Apply the configured address bias to a register, failing if it leaves u16 range.
    pub fn biased(&self, register: u16) -> eyre::Result<u16> {
        let addr = i64::from(register) + i64::from(self.scaling.addr_offset);
        u16::try_from(addr).map_err(|_| {
            eyre::eyre!(
                "register {register} with scaling.addr_offset {} is outside 0..=65535",
                self.scaling.addr_offset
            )
        })
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Link
        if self.link.host.trim().is_empty() {
            eyre::bail!("link.host must not be empty");
        }
        if self.link.port == 0 {
            eyre::bail!("link.port must be > 0");
        }
        if self.link.timeout_s == 0 {
            eyre::bail!("link.timeout_s must be >= 1");
        }

        // SOC thresholds
        let soc = &self.soc;
        if !soc.min.is_finite() || !soc.charge_min.is_finite() {
            eyre::bail!("soc.min and soc.charge_min must be finite");
        }
        if soc.min < 0.0 || soc.charge_min > 100.0 {
            eyre::bail!("soc thresholds must be within [0, 100]");
        }
        if soc.min >= soc.charge_min {
            eyre::bail!(
                "soc.min ({}) must be below soc.charge_min ({})",
                soc.min,
                soc.charge_min
            );
        }

        // Surplus
        if !(self.surplus.margin_w.is_finite() && self.surplus.margin_w >= 0.0) {
            eyre::bail!("surplus.margin_w must be >= 0");
        }
        if !(self.surplus.confirm_s.is_finite() && self.surplus.confirm_s >= 0.0) {
            eyre::bail!("surplus.confirm_s must be >= 0");
        }

        // Night integrator
        if !(self.night.pv_threshold_w.is_finite() && self.night.pv_threshold_w >= 0.0) {
            eyre::bail!("night.pv_threshold_w must be >= 0");
        }
        if !(self.night.confirm_s.is_finite() && self.night.confirm_s > 0.0) {
            eyre::bail!("night.confirm_s must be > 0");
        }
        if !(self.night.decay_factor >= 0.0 && self.night.decay_factor < 1.0) {
            eyre::bail!("night.decay_factor must be in [0.0, 1.0)");
        }

        // Shutdown
        if !(self.shutdown.off_delay_s.is_finite() && self.shutdown.off_delay_s >= 0.0) {
            eyre::bail!("shutdown.off_delay_s must be >= 0");
        }
        if self.shutdown.off_delay_s > MAX_DELAY_S {
            eyre::bail!("shutdown.off_delay_s is unreasonably large (>24h)");
        }

        // Timing
        let t = &self.timing;
        if !(t.poll_interval_s.is_finite() && t.poll_interval_s > 0.0) {
            eyre::bail!("timing.poll_interval_s must be > 0");
        }
        if t.poll_interval_s > 3600.0 {
            eyre::bail!("timing.poll_interval_s is unreasonably large (>1h)");
        }
        if !(t.min_write_gap_s.is_finite() && t.min_write_gap_s >= 0.0) {
            eyre::bail!("timing.min_write_gap_s must be >= 0");
        }
        if t.min_write_gap_s > MAX_DELAY_S {
            eyre::bail!("timing.min_write_gap_s is unreasonably large (>24h)");
        }
        if !(t.min_output_write_gap_s.is_finite() && t.min_output_write_gap_s >= 0.0) {
            eyre::bail!("timing.min_output_write_gap_s must be >= 0");
        }
        if t.min_output_write_gap_s > MAX_DELAY_S {
            eyre::bail!("timing.min_output_write_gap_s is unreasonably large (>24h)");
        }

        // Scaling
        if !(self.scaling.soc_divisor.is_finite() && self.scaling.soc_divisor > 0.0) {
            eyre::bail!("scaling.soc_divisor must be > 0");
        }

        // Registers (with bias applied)
        if self.registers.pv.is_empty() {
            eyre::bail!("registers.pv must list at least one register");
        }
        self.biased(self.registers.enable)?;
        self.biased(self.registers.soc)?;
        self.biased(self.registers.mode)?;
        self.biased(self.output.register)?;
        let load_base = self.biased(self.registers.load_base)?;
        if load_base.checked_add(2).is_none() {
            eyre::bail!("registers.load_base span (3 registers) exceeds 65535");
        }
        for reg in &self.registers.pv {
            self.biased(*reg)?;
        }

        // Output mode
        if self.output.allow_night_switch && self.output.day_value == self.output.night_value {
            eyre::bail!("output.day_value and output.night_value must differ when night switching is allowed");
        }

        Ok(())
    }
}
