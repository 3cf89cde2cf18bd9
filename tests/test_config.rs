use std::io::Write;

use outflow::config::{CONFIG_ENV, Config};
use outflow::http::file::Dotfiles;

// Environment variables are process-wide, so everything that touches them
// lives in this one test.
#[test]
fn test_config_env_overrides() {
    unsafe {
        std::env::remove_var(CONFIG_ENV);
        std::env::remove_var("LISTEN");
    }
    let cfg = Config::load();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");

    unsafe {
        std::env::set_var("LISTEN", "0.0.0.0:3000");
    }
    let cfg = Config::load();
    assert_eq!(cfg.listen_addr, "0.0.0.0:3000");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "listen_addr: \"127.0.0.1:9000\"\nfiles:\n  max_age_secs: 30").unwrap();
    unsafe {
        std::env::set_var(CONFIG_ENV, file.path());
    }
    let cfg = Config::load();
    // LISTEN still wins over the file
    assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.files.max_age_secs, 30);

    unsafe {
        std::env::set_var(CONFIG_ENV, "/nonexistent/outflow.yaml");
        std::env::remove_var("LISTEN");
    }
    let cfg = Config::load();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");

    unsafe {
        std::env::remove_var(CONFIG_ENV);
    }
}

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert!(cfg.response.etag);
    assert_eq!(cfg.response.jsonp_callback_name, "callback");
    assert_eq!(cfg.files.small_file_threshold, 64 * 1024);
    assert!(cfg.files.offload_reads);
    assert_eq!(cfg.files.dotfiles, Dotfiles::Ignore);
}

#[test]
fn test_config_from_yaml() {
    let yaml = r#"
static_root: /srv/www
response:
  json_spaces: 2
  cookie_secret: hunter2
files:
  small_file_threshold: 1024
  offload_reads: false
  dotfiles: deny
"#;
    let cfg = Config::from_yaml(yaml).unwrap();

    assert_eq!(cfg.static_root, std::path::PathBuf::from("/srv/www"));
    assert_eq!(cfg.response.json_spaces, Some(2));
    assert_eq!(cfg.response.cookie_secret.as_deref(), Some("hunter2"));
    // unspecified fields keep their defaults
    assert!(cfg.response.etag);
    assert_eq!(cfg.files.small_file_threshold, 1024);
    assert!(!cfg.files.offload_reads);
    assert_eq!(cfg.files.dotfiles, Dotfiles::Deny);
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
}

#[test]
fn test_config_rejects_bad_yaml() {
    assert!(Config::from_yaml("files:\n  dotfiles: sometimes\n").is_err());
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.listen_addr, cfg2.listen_addr);
}
