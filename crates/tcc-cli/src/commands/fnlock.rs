//! Fn-lock command implementation.

use std::path::PathBuf;

use anyhow::{Result, bail};
use tcc_core::TccdClient;

use crate::cli::Toggle;
use crate::format::{format_switch, label};
use crate::util::{require_applied, write_output};

pub async fn cmd_fn_lock(
    tccd: &TccdClient,
    state: Option<Toggle>,
    output: Option<&PathBuf>,
    quiet: bool,
    no_color: bool,
) -> Result<()> {
    if !tccd.fn_lock_supported().await {
        bail!("Fn lock is not supported on this device");
    }

    match state {
        None => {
            let on = tccd.fn_lock_status().await;
            let content = format!("{}{}\n", label("Fn lock", no_color), format_switch(on, no_color));
            write_output(output, &content)?;
        }
        Some(toggle) => {
            require_applied(tccd.set_fn_lock_status(toggle.is_on()).await, "Fn lock state")?;
            if !quiet {
                eprintln!("Fn lock {}", format_switch(toggle.is_on(), no_color));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};
    use tcc_core::MockTransport;
    use tcc_core::tccd::methods;

    use super::*;

    #[tokio::test]
    async fn test_unsupported_device_makes_no_write() {
        let transport = MockTransport::with_handler(|_, _| Ok(json!(false)));
        let tccd = TccdClient::new(Arc::new(transport.clone()));
        assert!(tccd.init("tccd").await);

        let result = cmd_fn_lock(&tccd, Some(Toggle::On), None, true, true).await;
        assert!(result.is_err());
        assert_eq!(transport.calls_to(methods::SET_FN_LOCK_STATUS), 0);
    }

    #[tokio::test]
    async fn test_set_fn_lock() {
        let transport = MockTransport::with_handler(|method, args| {
            Ok(match method {
                methods::GET_FN_LOCK_SUPPORTED => json!(true),
                methods::SET_FN_LOCK_STATUS => Value::Bool(args.first() == Some(&json!(false))),
                _ => Value::Null,
            })
        });
        let tccd = TccdClient::new(Arc::new(transport.clone()));
        assert!(tccd.init("tccd").await);

        cmd_fn_lock(&tccd, Some(Toggle::Off), None, true, true)
            .await
            .unwrap();
        // This mock only accepts switching off
        assert!(
            cmd_fn_lock(&tccd, Some(Toggle::On), None, true, true)
                .await
                .is_err()
        );
        assert_eq!(transport.calls_to(methods::SET_FN_LOCK_STATUS), 2);
    }

    #[tokio::test]
    async fn test_show_fn_lock_to_file() {
        let transport = MockTransport::with_handler(|method, _| {
            Ok(json!(matches!(
                method,
                methods::GET_FN_LOCK_SUPPORTED | methods::GET_FN_LOCK_STATUS
            )))
        });
        let tccd = TccdClient::new(Arc::new(transport));
        assert!(tccd.init("tccd").await);

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("fnlock.txt");
        cmd_fn_lock(&tccd, None, Some(&path), true, true).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), format!("{}on", label("Fn lock", true)));
    }
}
