//! Yes/No の対話プロンプト

use crate::error::Result;
use std::io::{BufRead, Write};

/// 確認を求める相手
pub trait Prompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;
}

/// 標準入力から答えを読む
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        ask(&mut stdin.lock(), &mut stdout.lock(), question, default)
    }
}

/// 常にデフォルトで答える（CIなど入力のない環境向け）
#[derive(Debug, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        tracing::info!("{}-> {} (non-interactive)", question, default);
        Ok(default)
    }
}

/// 質問を表示して yes/no を読む
///
/// 空行と EOF はデフォルト扱い。解釈できない入力は聞き直す。
pub fn ask<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    question: &str,
    default: bool,
) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(writer, "{}{}: ", question, hint)?;
        writer.flush()?;

        let mut input = String::new();
        if reader.read_line(&mut input)? == 0 {
            writeln!(writer)?;
            return Ok(default);
        }

        match input.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(writer, "Please enter \"yes\" or \"no\".")?,
        }
    }
}
