#![allow(
    clippy::upper_case_acronyms,
    non_camel_case_types,
    clippy::too_many_arguments,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::too_many_lines,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]

pub mod barrier;
pub mod branch_predictor;
pub mod config;
pub mod core;
pub mod engine;
pub mod forwarding;
pub mod func_unit;
pub mod instruction;
pub mod mem;
pub mod pipeline;
pub mod register_file;
pub mod scheduler;
pub mod scoreboard;
pub mod simt_stack;
pub mod stats;
pub mod warp;

#[cfg(test)]
pub mod testing;

use color_eyre::eyre::{self, WrapErr};
use std::path::Path;

pub type address = u32;

/// Parse a program in memh format.
///
/// One hexadecimal word per line, `//` comments and blank lines are ignored.
pub fn parse_memh(text: &str) -> eyre::Result<Vec<u32>> {
    let mut words = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        let line = line.split("//").next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        for token in line.split_whitespace() {
            let token = token.trim_start_matches("0x").replace('_', "");
            let word = u32::from_str_radix(&token, 16)
                .wrap_err_with(|| format!("line {}: invalid word {token:?}", line_num + 1))?;
            words.push(word);
        }
    }
    Ok(words)
}

pub fn load_program(path: impl AsRef<Path>) -> eyre::Result<Vec<u32>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read program {}", path.display()))?;
    parse_memh(&text).wrap_err_with(|| format!("failed to parse program {}", path.display()))
}
