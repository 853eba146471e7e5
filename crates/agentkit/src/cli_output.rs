//! Centralised helpers for CLI output. Machine-readable results go to stdout, operator notes
//! to stderr.

use eyre::Context as _;
use std::io::Write as _;

pub fn write_json(v: &serde_json::Value, pretty: bool) -> eyre::Result<()> {
    let s = if pretty {
        serde_json::to_string_pretty(v)
    } else {
        serde_json::to_string(v)
    }
    .context("serialize output")?;
    write_line(&s)
}

pub fn write_line(s: &str) -> eyre::Result<()> {
    writeln!(std::io::stdout().lock(), "{s}").context("write stdout")
}

/// Operator hint; failures to write are ignored.
pub fn note(s: &str) {
    let mut stderr = std::io::stderr().lock();
    if stderr.write_all(s.as_bytes()).is_err() {
        return;
    }
    let _newline = stderr.write_all(b"\n");
    let _flush = stderr.flush();
}

/// Fixed-width table of supported networks.
pub fn networks_table(rows: &[[String; 5]]) -> String {
    let header = ["NETWORK", "CHAIN ID", "FAMILY", "SYMBOL", "TESTNET"];
    let mut widths = header.map(str::len);
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }
    let fmt_row = |cells: [&str; 5]| {
        cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_owned()
    };
    let mut out = vec![fmt_row(header)];
    for row in rows {
        out.push(fmt_row(row.each_ref().map(String::as_str)));
    }
    out.join("\n")
}
