//! Human-readable console output

use std::io::Write;
use std::time::Instant;

use crate::Result;
use crate::catalog::{Action, Argument};
use crate::hosts::Host;
use crate::snapshot::{Field, Snapshot};

use super::{
    NOT_AVAILABLE, Presenter, format_bit_rate, format_counter, format_uptime, group_thousands,
    or_na,
};

/// Plain-text report
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPresenter {
    /// List every discovered service with its actions and arguments
    pub show_services: bool,
    /// Include offline hosts
    pub all_hosts: bool,
    /// Process start; adds the total program time to the metrics
    pub program_started: Option<Instant>,
}

fn line(out: &mut dyn Write, label: &str, value: &str) -> std::io::Result<()> {
    writeln!(out, "  {label:<18}{value}")
}

fn yes_no(field: &Field<bool>, yes: &str, no: &str) -> String {
    or_na(field, |v| if *v { yes } else { no }.to_string())
}

impl TextPresenter {
    fn device(snapshot: &Snapshot, out: &mut dyn Write) -> std::io::Result<()> {
        let device = snapshot.device();
        writeln!(out, "Device")?;
        line(out, "Model:", &or_na(&device.model, Clone::clone))?;
        line(out, "Firmware:", &or_na(&device.firmware_version, Clone::clone))
    }

    fn connection(snapshot: &Snapshot, out: &mut dyn Write) -> std::io::Result<()> {
        let conn = snapshot.connection();
        writeln!(out, "\nConnection")?;
        line(out, "Status:", &or_na(&conn.status_text, Clone::clone))?;
        line(out, "Connected:", &yes_no(&conn.connected, "yes", "no"))?;
        line(out, "Link:", &yes_no(&conn.linked, "up", "down"))?;
        line(out, "External IP:", &or_na(&conn.external_ip, Clone::clone))?;
        line(out, "Uptime:", &or_na(&conn.uptime, format_uptime))?;
        line(out, "Max upstream:", &or_na(&conn.max_bit_rate_up, |n| format_bit_rate(*n)))?;
        line(out, "Max downstream:", &or_na(&conn.max_bit_rate_down, |n| format_bit_rate(*n)))?;
        line(out, "Bytes sent:", &or_na(&conn.bytes_sent, |n| format_counter(*n)))?;
        line(out, "Bytes received:", &or_na(&conn.bytes_received, |n| format_counter(*n)))
    }

    fn hosts(&self, snapshot: &Snapshot, out: &mut dyn Write) -> std::io::Result<()> {
        let hosts = match snapshot.hosts() {
            Field::Available(hosts) => hosts,
            Field::Unavailable(reason) => {
                writeln!(out, "\nHosts")?;
                return line(out, "Unavailable:", &format!("{} ({})", reason.kind, reason.reason));
            }
        };

        let online = hosts.iter().filter(|h| h.online()).count();
        let shown: Vec<&Host> = hosts
            .iter()
            .filter(|h| self.all_hosts || h.online())
            .collect();
        writeln!(out, "\nHosts ({online} online of {})", hosts.len())?;
        if shown.is_empty() {
            return Ok(());
        }

        let cell = |value: Option<&str>| value.unwrap_or(NOT_AVAILABLE).to_string();
        let rows: Vec<[String; 7]> = shown
            .iter()
            .map(|h| {
                [
                    cell(h.hostname.as_deref()),
                    cell(h.friendly_name.as_deref()),
                    cell(h.ipv4.as_deref()),
                    cell(h.ipv6.as_deref()),
                    h.mac().to_string(),
                    if h.online() { "Online" } else { "Offline" }.to_string(),
                    cell(h.interface_type.as_deref()),
                ]
            })
            .collect();

        let header = [
            "Hostname",
            "Friendly Name",
            "IPv4",
            "IPv6",
            "MAC",
            "Status",
            "Interface",
        ];
        let mut widths = header.map(str::len);
        for row in &rows {
            for (width, value) in widths.iter_mut().zip(row) {
                *width = (*width).max(value.chars().count());
            }
        }

        let render = |cells: &[&str]| {
            cells
                .iter()
                .zip(widths)
                .map(|(value, width)| format!("{value:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
        };

        writeln!(out, "  {}", render(header.as_slice()).trim_end())?;
        for row in &rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            writeln!(out, "  {}", render(cells.as_slice()).trim_end())?;
        }
        Ok(())
    }

    fn telemetry(snapshot: &Snapshot, out: &mut dyn Write) -> std::io::Result<()> {
        if snapshot.telemetry().is_empty() {
            return Ok(());
        }
        writeln!(out, "\nOther traffic fields")?;
        for field in snapshot.telemetry() {
            line(
                out,
                &format!("{}.{}", field.service, field.field),
                &field.value.to_string(),
            )?;
        }
        Ok(())
    }

    fn services(snapshot: &Snapshot, out: &mut dyn Write) -> std::io::Result<()> {
        let catalog = snapshot.catalog();
        writeln!(out, "\nServices ({})", catalog.len())?;
        for service in catalog.services() {
            writeln!(out, "  {}", service.name)?;
            for action in service.actions.values() {
                writeln!(out, "    {}", signature(action))?;
            }
        }
        Ok(())
    }

    fn metrics(&self, snapshot: &Snapshot, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "\nPerformance")?;
        line(
            out,
            "Collected at:",
            &snapshot.collected_at().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )?;
        line(
            out,
            "Retrieval time:",
            &format!("{:.3} s", snapshot.elapsed().as_secs_f64()),
        )?;
        line(
            out,
            "Bytes retrieved:",
            &format!("{} bytes", group_thousands(snapshot.bytes_retrieved())),
        )?;
        if let Some(started) = self.program_started {
            line(
                out,
                "Total time:",
                &format!("{:.3} s", started.elapsed().as_secs_f64()),
            )?;
        }
        Ok(())
    }
}

/// `GetInfo(NewIndex) -> NewModelName, NewSoftwareVersion`
fn signature(action: &Action) -> String {
    let names = |arguments: &[Argument]| {
        arguments
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut text = format!("{}({})", action.name, names(action.inputs.as_slice()));
    if !action.outputs.is_empty() {
        text.push_str(" -> ");
        text.push_str(&names(action.outputs.as_slice()));
    }
    text
}

impl Presenter for TextPresenter {
    fn present(&self, snapshot: &Snapshot, out: &mut dyn Write) -> Result<()> {
        Self::device(snapshot, out)?;
        Self::connection(snapshot, out)?;
        self.hosts(snapshot, out)?;
        Self::telemetry(snapshot, out)?;
        if self.show_services {
            Self::services(snapshot, out)?;
        }
        self.metrics(snapshot, out)?;
        Ok(())
    }
}
