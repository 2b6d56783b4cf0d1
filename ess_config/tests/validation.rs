use ess_config::{Config, load_toml};
use rstest::rstest;

const FULL: &str = r#"
dry_run = true

[link]
host = "10.0.0.5"
port = 1502
timeout_s = 3

[units]
read = 100
mode = 242
output = 100

[registers]
enable = 806
soc = 843
load_base = 817
pv = [811, 812, 813, 850]
mode = 33

[output]
register = 2902
day_value = 1
night_value = 2
allow_night_switch = true

[soc]
min = 30.0
charge_min = 55.0

[surplus]
margin_w = 150.0
confirm_s = 90.0

[night]
pv_threshold_w = 120.0
confirm_s = 900.0
decay_factor = 0.5
turn_off_below_charge_min = false

[shutdown]
off_delay_s = 45.0

[timing]
poll_interval_s = 2.0
min_write_gap_s = 10.0
min_output_write_gap_s = 60.0

[scaling]
soc_divisor = 10.0
addr_offset = -1
"#;

#[test]
fn parses_full_file() {
    let cfg = load_toml(FULL).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert!(cfg.dry_run);
    assert_eq!(cfg.link.port, 1502);
    assert_eq!(cfg.units.mode, 242);
    assert_eq!(cfg.registers.pv, vec![811, 812, 813, 850]);
    assert!(cfg.output.allow_night_switch);
    assert_eq!(cfg.shutdown.off_delay_s, 45.0);
    assert!(!cfg.shutdown.require_night_before_restart);
    assert_eq!(cfg.scaling.addr_offset, -1);
}

#[test]
fn partial_sections_keep_defaults() {
    let cfg = load_toml("[soc]\nmin = 20.0\n").expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.soc.min, 20.0);
    assert_eq!(cfg.soc.charge_min, 50.0);
    assert_eq!(cfg.shutdown.off_delay_s, 30.0);
    assert_eq!(cfg.link.host, "192.168.41.101");
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(load_toml("[soc]\nminimum = 20.0\n").is_err());
}

#[rstest]
#[case("[soc]\nmin = 60.0\ncharge_min = 50.0\n", "must be below soc.charge_min")]
#[case("[soc]\nmin = -1.0\n", "within [0, 100]")]
#[case("[night]\ndecay_factor = 1.0\n", "decay_factor must be in [0.0, 1.0)")]
#[case("[night]\nconfirm_s = 0.0\n", "night.confirm_s must be > 0")]
#[case("[timing]\npoll_interval_s = 0.0\n", "poll_interval_s must be > 0")]
#[case("[timing]\nmin_write_gap_s = -5.0\n", "min_write_gap_s must be >= 0")]
#[case(
    "[timing]\nmin_output_write_gap_s = 1e9\n",
    "min_output_write_gap_s is unreasonably large"
)]
#[case("[timing]\nmin_write_gap_s = 90000.0\n", "min_write_gap_s is unreasonably large")]
#[case("[shutdown]\noff_delay_s = 1e20\n", "off_delay_s is unreasonably large")]
#[case("[scaling]\nsoc_divisor = 0.0\n", "soc_divisor must be > 0")]
#[case("[registers]\npv = []\n", "at least one register")]
#[case("[registers]\nload_base = 65534\n", "span")]
#[case("[scaling]\naddr_offset = -900\n", "outside 0..=65535")]
#[case("[link]\nhost = \" \"\n", "link.host")]
#[case("[link]\ntimeout_s = 0\n", "timeout_s must be >= 1")]
#[case(
    "[output]\nallow_night_switch = true\nday_value = 1\nnight_value = 1\n",
    "must differ"
)]
fn rejects_invalid(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "error {err:?} does not mention {needle:?}"
    );
}

#[test]
fn effective_config_round_trips_through_toml() {
    let cfg = load_toml(FULL).expect("parse TOML");
    let text = toml::to_string_pretty(&cfg).expect("serialize");
    let back: Config = load_toml(&text).expect("reparse");
    assert_eq!(back, cfg);
}

#[test]
fn day_long_delays_are_accepted() {
    let toml = "[shutdown]\noff_delay_s = 86400.0\n[timing]\nmin_write_gap_s = 86400.0\n";
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("a 24h dwell is still valid");
}
