//! Interactive serial port selection.
//!
//! Port selection works like espflash's: known boards are auto-selected or
//! listed first, unknown ports need confirmation, and non-interactive mode
//! is deterministic and never prompts (for CI/script callers).

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    sketchport::{DetectedPort, PortInfo, detect_ports},
    std::{cmp::Ordering, io::IsTerminal},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// List all ports (including unrecognized ones).
    pub list_all_ports: bool,
    /// Non-interactive mode (fail if ambiguous).
    pub non_interactive: bool,
    /// Force confirmation even for a single recognized port.
    pub confirm_port: bool,
}

/// Result of port selection including whether it was a known device.
#[derive(Debug)]
pub struct SelectedPort {
    /// The selected port info.
    pub port: DetectedPort,
    /// Whether this port matched a known/configured board.
    pub is_known: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    // Selection failures are usage-class so they map to exit code 2;
    // script callers branch on that.
    CliError::Usage(message.to_string()).into()
}

fn select_non_interactive_port(
    candidates: Vec<DetectedPort>,
    config: &Config,
) -> Result<SelectedPort> {
    // Exactly one candidate is a valid auto-selection; zero or several are
    // setup problems the caller has to resolve.
    match candidates.len().cmp(&1) {
        Ordering::Equal => {
            let port = candidates
                .into_iter()
                .next()
                .expect("candidates has exactly 1 element here");
            Ok(SelectedPort {
                is_known: is_known_board(&port, config),
                port,
            })
        },
        Ordering::Greater => Err(usage_err(
            "multiple serial ports found; pass --port to choose one",
        )),
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    // Explicit port always wins
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name));
    }

    // Then a configured preference
    if let Some(port_name) = &config.connection.port {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name));
    }

    let ports = detect_ports();

    if ports.is_empty() {
        return Err(usage_err("no serial ports found; is the board plugged in?"));
    }

    // Known boards first unless the user asked for everything
    let known_ports: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| is_known_board(p, config))
        .cloned()
        .collect();

    let candidates: Vec<DetectedPort> = if options.list_all_ports || known_ports.is_empty() {
        ports
    } else {
        known_ports
    };

    if options.non_interactive {
        return select_non_interactive_port(candidates, config);
    }

    match candidates.len().cmp(&1) {
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(candidates, config)
        },
        Ordering::Equal => {
            let port = candidates
                .into_iter()
                .next()
                .expect("candidates has exactly 1 element here");
            let is_known = is_known_board(&port, config);

            if is_known && !options.confirm_port {
                info!(
                    "Auto-selected port: {} [{}]",
                    port.info.name,
                    port.board.unwrap_or("unknown")
                );
                Ok(SelectedPort { port, is_known })
            } else {
                ensure_interactive_terminal()?;
                confirm_single_port(port)
            }
        },
        Ordering::Less => Err(usage_err("no serial ports available")),
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Usage(
            "interactive port selection needs a terminal; pass --port or --non-interactive"
                .to_string(),
        )
        .into())
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("port selection cancelled".to_string()).into()
            } else {
                CliError::Usage("port selection prompt failed".to_string()).into()
            }
        },
    }
}

/// Find a port by name, falling back to a placeholder for ports the host
/// does not currently enumerate (the user explicitly asked for it).
fn find_port_by_name(name: &str) -> SelectedPort {
    let ports = detect_ports();

    if let Some(port) = ports.iter().find(|p| p.info.name == name) {
        return SelectedPort {
            is_known: port.is_recognized(),
            port: port.clone(),
        };
    }

    // Case-insensitive match (Windows COM ports)
    if let Some(port) = ports.iter().find(|p| p.info.name.eq_ignore_ascii_case(name)) {
        return SelectedPort {
            is_known: port.is_recognized(),
            port: port.clone(),
        };
    }

    SelectedPort {
        port: DetectedPort::from_info(PortInfo {
            name: name.to_string(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }),
        is_known: false,
    }
}

/// Check if a port matches a known board (signature table or config).
fn is_known_board(port: &DetectedPort, config: &Config) -> bool {
    if port.is_recognized() {
        return true;
    }

    if let (Some(vid), Some(pid)) = (port.info.vid, port.info.pid) {
        for device in &config.usb_device {
            if device.matches(vid, pid) {
                return true;
            }
        }
    }

    false
}

/// Interactive port selection.
fn select_port_interactive(mut ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} {} serial ports detected (known boards listed first)",
        style("ℹ").blue(),
        ports.len()
    );

    // Sort: known boards first
    ports.sort_by_key(|p| !is_known_board(p, config));

    let labels: Vec<String> = ports
        .iter()
        .map(|port| {
            let name = if is_known_board(port, config) {
                style(&port.info.name).bold().to_string()
            } else {
                port.info.name.clone()
            };

            let board_info = if let Some(board) = port.board {
                format!(" [{}]", style(board).yellow())
            } else if let (Some(vid), Some(pid)) = (port.info.vid, port.info.pid) {
                format!(" ({vid:04X}:{pid:04X})")
            } else {
                String::new()
            };

            let product = port
                .info
                .product
                .as_ref()
                .map(|p| format!(" - {}", style(p).dim()))
                .unwrap_or_default();

            format!("{name}{board_info}{product}")
        })
        .collect();

    // Truncate labels so narrow terminals don't wrap the selection list
    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = labels
        .into_iter()
        .map(|n| console::truncate_str(&n, max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => {
            let port = ports
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
            let is_known = is_known_board(&port, config);
            Ok(SelectedPort { port, is_known })
        },
        None => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}

/// Confirm use of a single unrecognized port.
fn confirm_single_port(port: DetectedPort) -> Result<SelectedPort> {
    let product_info = port
        .info
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use port {}{product_info}?", port.info.name))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(SelectedPort {
            port,
            is_known: false,
        })
    } else {
        Err(CliError::Cancelled("port selection cancelled".to_string()).into())
    }
}

/// Ask the user whether to remember this port's USB identity.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    if let (Some(vid), Some(pid)) = (port.info.vid, port.info.pid) {
        for device in &config.usb_device {
            if device.matches(vid, pid) {
                return Ok(()); // Already saved
            }
        }

        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Remember this board for future auto-selection?")
            .default(false)
            .interact_opt()
            .map_err(map_prompt_error)?
            .unwrap_or(false);

        if confirmed {
            if let Err(e) = config.remember_usb_device(vid, pid) {
                error!("Failed to save port configuration: {e}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchport::PortInfo;

    fn detected(name: &str, vid: Option<u16>, pid: Option<u16>) -> DetectedPort {
        DetectedPort::from_info(PortInfo {
            name: name.to_string(),
            vid,
            pid,
            manufacturer: None,
            product: None,
            serial_number: None,
        })
    }

    #[test]
    fn test_serial_options_default() {
        let options = SerialOptions::default();
        assert!(options.port.is_none());
        assert!(!options.list_all_ports);
        assert!(!options.non_interactive);
        assert!(!options.confirm_port);
    }

    #[test]
    fn test_is_known_board_builtin_signature() {
        let port = detected("/dev/ttyACM0", Some(0x2341), Some(0x0043));
        assert!(is_known_board(&port, &Config::default()));
    }

    #[test]
    fn test_is_known_board_unknown_ids() {
        let port = detected("/dev/ttyUSB0", Some(0x9999), Some(0x9999));
        assert!(!is_known_board(&port, &Config::default()));
    }

    #[test]
    fn test_is_known_board_from_config() {
        let port = detected("/dev/ttyUSB0", Some(0xABCD), Some(0x1234));
        let mut config = Config::default();
        config.usb_device.push(crate::config::UsbDevice {
            vid: 0xABCD,
            pid: 0x1234,
        });
        assert!(is_known_board(&port, &config));
    }

    #[test]
    fn test_is_known_board_without_usb_metadata() {
        let port = detected("/dev/ttyS0", None, None);
        assert!(!is_known_board(&port, &Config::default()));
    }

    #[test]
    fn test_select_non_interactive_single_port() {
        let ports = vec![detected("/dev/ttyUSB0", None, None)];
        let selected = select_non_interactive_port(ports, &Config::default()).unwrap();
        assert_eq!(selected.port.info.name, "/dev/ttyUSB0");
        assert!(!selected.is_known);
    }

    #[test]
    fn test_select_non_interactive_multiple_ports_is_usage_error() {
        let ports = vec![
            detected("/dev/ttyUSB0", None, None),
            detected("/dev/ttyUSB1", None, None),
        ];
        let err = select_non_interactive_port(ports, &Config::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_select_non_interactive_no_ports_is_usage_error() {
        let err = select_non_interactive_port(vec![], &Config::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_find_port_by_name_placeholder_for_unlisted() {
        // A name the host certainly doesn't enumerate
        let selected = find_port_by_name("/dev/tty-sketchport-test-does-not-exist");
        assert_eq!(
            selected.port.info.name,
            "/dev/tty-sketchport-test-does-not-exist"
        );
        assert!(!selected.is_known);
        assert!(selected.port.info.vid.is_none());
    }
}
