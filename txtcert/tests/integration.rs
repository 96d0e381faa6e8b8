use std::path::Path;
use std::process::{Command, Output};

const CLEARED_ENV: &[&str] = &[
    "TXTCERT_CONFIG",
    "CLOUDFLARE_KEY",
    "ACME_MAIL",
    "DOMAINS",
    "ACME_DIRECTORY",
    "ACME_EAB_KID",
    "ACME_EAB_HMAC_KEY",
    "RUST_LOG",
];

fn txtcert(args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_txtcert"));
    for var in CLEARED_ENV {
        command.env_remove(var);
    }
    command.args(args).output().unwrap()
}

fn dir_args(base: &Path) -> Vec<String> {
    vec![
        "--config-dir".to_string(),
        base.join("config").display().to_string(),
        "--cert-dir".to_string(),
        base.join("cert").display().to_string(),
        "--account-dir".to_string(),
        base.join("account").display().to_string(),
    ]
}

#[test]
fn test_version() {
    let output = txtcert(&["version"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("txtcert v{}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_check_lists_domains() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = vec![
        "check",
        "--cloudflare-key",
        "cf-token",
        "--acme-mail",
        "ops@example.com",
        "--domains",
        "example.com,*.example.org",
        "--staging",
    ];
    let dirs = dir_args(dir.path());
    args.extend(dirs.iter().map(String::as_str));

    let output = txtcert(&args);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("example.com - due (no certificate)"));
    assert!(stdout.contains("*.example.org - due"));
    assert!(stdout.contains("staging"));
    assert!(!stdout.contains("cf-token"));

    // check never writes state
    assert!(!dir.path().join("config").exists());
    assert!(!dir.path().join("account").exists());
}

#[test]
fn test_check_reads_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("txtcert.toml");
    std::fs::write(
        &config_path,
        r#"
            email = "ops@example.com"
            cloudflare_token = "cf-token"
            domains = ["api.example.com"]
        "#,
    )
    .unwrap();

    let mut args = vec!["check", "--config", config_path.to_str().unwrap()];
    let dirs = dir_args(dir.path());
    args.extend(dirs.iter().map(String::as_str));

    let output = txtcert(&args);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("api.example.com"));
}

#[test]
fn test_check_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = vec!["check", "--acme-mail", "ops@example.com"];
    let dirs = dir_args(dir.path());
    args.extend(dirs.iter().map(String::as_str));

    let output = txtcert(&args);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("CLOUDFLARE_KEY"));
}

#[test]
fn test_once_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = vec!["once", "--cloudflare-key", "cf-token"];
    let dirs = dir_args(dir.path());
    args.extend(dirs.iter().map(String::as_str));

    let output = txtcert(&args);
    assert!(!output.status.success());
}
