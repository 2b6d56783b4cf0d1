//! Link assembly and the `run` / `probe` / `check` commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ess_config::Config;
use ess_core::{ControlLoop, EngineCfg, RegisterMap, RunSummary};
use ess_hardware::{SimLayout, SimParams, SimulatedLink};
use ess_traits::{Clock, MonotonicClock, RegisterLink};
use eyre::{Result, WrapErr};

use crate::error_fmt::InvalidConfiguration;

pub struct RunOpts {
    pub dry_run: bool,
    pub sim: bool,
    pub cycles: Option<u64>,
}

fn sim_layout(map: &RegisterMap) -> SimLayout {
    SimLayout {
        read_unit: map.read_unit,
        enable: map.enable,
        soc: map.soc,
        load_base: map.load_base,
        pv: map.pv.clone(),
        soc_divisor: map.soc_divisor,
        mode_unit: map.mode_unit,
        mode: map.mode,
        output_unit: map.output_unit,
        output: map.output,
    }
}

fn make_link(
    cfg: &Config,
    engine: &EngineCfg,
    sim: bool,
    clock: &Arc<dyn Clock + Send + Sync>,
) -> Result<Box<dyn RegisterLink + Send>> {
    if sim {
        tracing::info!("using simulated plant");
        return Ok(Box::new(SimulatedLink::new(
            sim_layout(&engine.registers),
            SimParams::default(),
            Arc::clone(clock),
        )));
    }
    #[cfg(feature = "modbus")]
    {
        Ok(Box::new(ess_hardware::ModbusLink::new(
            cfg.link.host.clone(),
            cfg.link.port,
            Duration::from_secs(cfg.link.timeout_s),
        )))
    }
    #[cfg(not(feature = "modbus"))]
    {
        let _ = cfg;
        eyre::bail!("this build has no modbus support; pass --sim")
    }
}

fn build_loop(cfg: &Config, sim: bool, dry_run: bool) -> Result<ControlLoop> {
    let mut engine = EngineCfg::try_from(cfg).wrap_err(InvalidConfiguration)?;
    engine.governor.dry_run |= dry_run;
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let link = make_link(cfg, &engine, sim, &clock)?;
    ControlLoop::builder()
        .with_link(link)
        .with_clock(clock)
        .with_config(engine)
        .build()
}

fn log_start(cfg: &Config, dry_run: bool, sim: bool) {
    tracing::info!(
        host = %cfg.link.host,
        port = cfg.link.port,
        timeout_s = cfg.link.timeout_s,
        read_unit = cfg.units.read,
        enable_reg = cfg.registers.enable,
        mode_unit = cfg.units.mode,
        mode_reg = cfg.registers.mode,
        output_unit = cfg.units.output,
        output_reg = cfg.output.register,
        day_value = cfg.output.day_value,
        night_value = cfg.output.night_value,
        allow_night_switch = cfg.output.allow_night_switch,
        dry_run,
        sim,
        "start"
    );
    if dry_run {
        tracing::warn!("dry-run: no register will be written");
    }
}

pub fn run_daemon(cfg: &Config, opts: &RunOpts, json: bool) -> Result<RunSummary> {
    let dry_run = opts.dry_run || cfg.dry_run;
    log_start(cfg, dry_run, opts.sim);
    let mut lp = build_loop(cfg, opts.sim, dry_run)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })
    .wrap_err("failed to install signal handler")?;

    lp.startup_sync();
    let summary = ess_core::run(&mut lp, &shutdown, opts.cycles);
    if shutdown.load(Ordering::Relaxed) {
        tracing::info!("terminated by signal");
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "cycles": summary.cycles,
                "applied": summary.applied,
                "disabled": summary.disabled,
                "read_failures": summary.read_failures,
                "writes": summary.writes,
                "dry_run_writes": summary.dry_run_writes,
                "write_failures": summary.write_failures,
                "interrupted": summary.interrupted,
                "mode": lp.mode().to_string(),
            })
        );
    } else {
        println!(
            "stopped after {} cycles ({} applied, {} disabled, {} read failures, {} writes, {} dry-run writes); mode {}",
            summary.cycles,
            summary.applied,
            summary.disabled,
            summary.read_failures,
            summary.writes,
            summary.dry_run_writes,
            lp.mode()
        );
    }
    Ok(summary)
}

pub fn probe(cfg: &Config, sim: bool, json: bool) -> Result<()> {
    let mut lp = build_loop(cfg, sim, true)?;
    let p = lp.probe().wrap_err("read pass failed")?;
    let mode_name = p
        .mode_register
        .and_then(ess_core::Mode::from_register)
        .map_or_else(|| "unknown".to_string(), |m| m.to_string());
    if json {
        println!(
            "{}",
            serde_json::json!({
                "enabled": p.reading.enabled,
                "soc": p.reading.soc,
                "load_w": p.reading.load_w,
                "pv_w": p.reading.pv_w,
                "mode_register": p.mode_register,
                "mode": mode_name,
                "output_register": p.output_register,
            })
        );
    } else {
        println!("enabled:          {}", p.reading.enabled);
        println!("soc:              {:.1} %", p.reading.soc);
        println!("load:             {:.0} W", p.reading.load_w);
        println!("pv:               {:.0} W", p.reading.pv_w);
        match p.mode_register {
            Some(raw) => println!("mode register:    {raw} ({mode_name})"),
            None => println!("mode register:    unreadable"),
        }
        match p.output_register {
            Some(raw) => println!("output register:  {raw}"),
            None => println!("output register:  unreadable"),
        }
    }
    Ok(())
}

pub fn check(cfg: &Config, json: bool) -> Result<()> {
    // Catch address-bias overflows the schema check cannot see.
    EngineCfg::try_from(cfg).wrap_err(InvalidConfiguration)?;
    let rendered = if json {
        serde_json::to_string_pretty(cfg).wrap_err("failed to render config")?
    } else {
        toml::to_string_pretty(cfg).wrap_err("failed to render config")?
    };
    println!("{rendered}");
    Ok(())
}
