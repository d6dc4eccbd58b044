//! nmcli command strings and terse-output parsers.
//!
//! Terse mode (`-t`) separates fields with `:` and escapes a literal `:` or
//! `\` inside a field with a backslash, so SSIDs like `cafe:guest` survive.

use std::collections::HashSet;

use crate::services::command::shell_quote;

use super::WifiNetwork;

pub const RADIO_STATUS: &str = "nmcli radio wifi";
pub const RADIO_ON: &str = "nmcli radio wifi on";
pub const RADIO_OFF: &str = "nmcli radio wifi off";
pub const RESCAN: &str = "nmcli device wifi rescan";
pub const SCAN_LIST: &str = "nmcli -t -f SSID,SIGNAL,SECURITY,ACTIVE device wifi list";
pub const ACTIVE_SIGNAL: &str = "nmcli -t -f ACTIVE,SIGNAL device wifi list";
pub const SAVED_CONNECTIONS: &str = "nmcli -t -f NAME,TYPE connection show";
pub const ACTIVE_CONNECTIONS: &str = "nmcli -t -f NAME,TYPE,DEVICE connection show --active";
pub const DEVICE_STATUS: &str = "nmcli -t -f DEVICE,TYPE device status";

/// Connection profile type of WiFi connections.
pub const WIRELESS_TYPE: &str = "802-11-wireless";
/// Device type of WiFi interfaces in `device status`.
pub const WIFI_DEVICE_TYPE: &str = "wifi";

pub fn connect_saved(ssid: &str) -> String {
    format!("nmcli connection up {}", shell_quote(ssid))
}

pub fn connect_open(ssid: &str) -> String {
    format!("nmcli device wifi connect {}", shell_quote(ssid))
}

pub fn connect_with_password(ssid: &str, password: &str) -> String {
    format!(
        "nmcli device wifi connect {} password {}",
        shell_quote(ssid),
        shell_quote(password)
    )
}

pub fn forget(ssid: &str) -> String {
    format!("nmcli connection delete {}", shell_quote(ssid))
}

pub fn disconnect_device(device: &str) -> String {
    format!("nmcli device disconnect {}", shell_quote(device))
}

/// Split one terse line into fields, undoing `\:` and `\\`.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn terse_rows(text: &str) -> impl Iterator<Item = Vec<String>> + '_ {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(split_terse)
}

/// `nmcli radio wifi` prints `enabled` or `disabled`.
pub fn parse_radio(text: &str) -> bool {
    text.trim() == "enabled"
}

/// Names of saved WiFi profiles.
pub fn parse_saved(text: &str) -> HashSet<String> {
    terse_rows(text)
        .filter(|row| row.len() >= 2 && row[1] == WIRELESS_TYPE && !row[0].is_empty())
        .map(|mut row| row.swap_remove(0))
        .collect()
}

/// Name of the first active wireless connection bound to a device.
pub fn parse_active_connection(text: &str) -> Option<String> {
    terse_rows(text)
        .find(|row| row.len() >= 3 && row[1] == WIRELESS_TYPE && !row[2].is_empty())
        .map(|mut row| row.swap_remove(0))
}

/// First WiFi device in `device status`.
pub fn parse_wifi_device(text: &str) -> Option<String> {
    terse_rows(text)
        .find(|row| row.len() >= 2 && row[1] == WIFI_DEVICE_TYPE && !row[0].is_empty())
        .map(|mut row| row.swap_remove(0))
}

/// Signal percentage. Anything that is not a number reads as 0.
pub fn parse_signal(field: &str) -> u8 {
    field
        .trim()
        .parse::<u32>()
        .map(|v| v.min(100) as u8)
        .unwrap_or(0)
}

/// Signal of the row marked active in `ACTIVE,SIGNAL` output.
pub fn parse_active_signal(text: &str) -> Option<u8> {
    terse_rows(text)
        .find(|row| row.len() >= 2 && row[0] == "yes")
        .map(|row| parse_signal(&row[1]))
}

/// Build the ranked network list from `SSID,SIGNAL,SECURITY,ACTIVE` rows.
///
/// Rows with fewer than four fields or an empty SSID are skipped. The first
/// row for an SSID wins. The result is sorted by signal, strongest first
/// (ties keep scan order), and cut to `limit`.
pub fn parse_scan(text: &str, saved: &HashSet<String>, limit: usize) -> Vec<WifiNetwork> {
    let mut seen = HashSet::new();
    let mut networks: Vec<WifiNetwork> = terse_rows(text)
        .filter(|row| row.len() >= 4)
        .filter_map(|row| {
            let ssid = &row[0];
            if ssid.is_empty() || !seen.insert(ssid.clone()) {
                return None;
            }
            Some(WifiNetwork {
                ssid: ssid.clone(),
                signal: parse_signal(&row[1]),
                security: row[2].trim().to_string(),
                active: row[3] == "yes",
                saved: saved.contains(ssid),
            })
        })
        .collect();

    networks.sort_by(|a, b| b.signal.cmp(&a.signal));
    networks.truncate(limit);
    networks
}
