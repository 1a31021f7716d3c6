#![forbid(unsafe_code)]

//! Polyglot header: one byte range that is both a POSIX `sh` script and a
//! Windows batch file.
//!
//! The opener line `:<<'::BATCH_END'` is a no-op command with a quoted
//! heredoc for `sh`, and a label for `cmd.exe`. `sh` therefore skips the
//! whole batch region, while `cmd.exe` runs it and leaves through `exit /b`
//! before it reaches the shell region.
//!
//! Numeric values are written as `{{name}}` tokens and substituted by
//! [`Template::render`]. The rendered length depends on the digit count of
//! the substituted values, see [`crate::bundle::layout`].

use crate::bundle::error::{BundleError, BundleResult};

/// Which interpreter has to accept a region's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// Parsed by both `sh` and `cmd.exe`.
    Both,
    /// Executed by `cmd.exe`; `sh` reads it as heredoc body.
    Batch,
    /// Executed by `sh`; `cmd.exe` exits before reaching it.
    Shell,
}

#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub name: &'static str,
    pub grammar: Grammar,
    pub text: &'static str,
}

/// A semantic value the header needs. Each field owns exactly one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    FormatVersion,
    /// 0-based payload start (PowerShell `Seek`).
    PayloadOffset,
    /// 1-based payload start (`tail -c +N`).
    PayloadSkip,
    PayloadSize,
    ContentOffset,
    PageBoundary,
    ContentBoundary,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::FormatVersion,
        Field::PayloadOffset,
        Field::PayloadSkip,
        Field::PayloadSize,
        Field::ContentOffset,
        Field::PageBoundary,
        Field::ContentBoundary,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Field::FormatVersion => "{{format_version}}",
            Field::PayloadOffset => "{{payload_offset}}",
            Field::PayloadSkip => "{{payload_skip}}",
            Field::PayloadSize => "{{payload_size}}",
            Field::ContentOffset => "{{content_offset}}",
            Field::PageBoundary => "{{page_boundary}}",
            Field::ContentBoundary => "{{content_boundary}}",
        }
    }
}

/// Ordered field -> value map applied by [`Template::render`].
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: Vec<(Field, u64)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, field: Field, value: u64) -> BundleResult<Self> {
        if self.values.iter().any(|(f, _)| *f == field) {
            return Err(BundleError::DuplicateToken(field.token().to_string()));
        }
        self.values.push((field, value));
        Ok(self)
    }

    pub fn get(&self, field: Field) -> Option<u64> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, u64)> + '_ {
        self.values.iter().copied()
    }
}

const OPENER: &str = ":<<'::BATCH_END'\n";

const BATCH: &str = r#"@echo off
rem polybundle format={{format_version}} payload_offset={{payload_offset}} payload_size={{payload_size}} content_offset={{content_offset}} page_boundary={{page_boundary}} content_boundary={{content_boundary}}
setlocal
set "bundle_src=%~f0"
set "bundle_tmp=%TEMP%\polybundle-%RANDOM%%RANDOM%.exe"
powershell -NoProfile -ExecutionPolicy Bypass -Command "$ErrorActionPreference='Stop';$i=[IO.File]::OpenRead($env:bundle_src);try{$o=[IO.File]::Create($env:bundle_tmp);try{[void]$i.Seek({{payload_offset}},0);$b=New-Object byte[] 65536;$n=[long]{{payload_size}};while($n -gt 0){$r=$i.Read($b,0,[int][Math]::Min([long]$b.Length,$n));if($r -le 0){throw 'short payload'};$o.Write($b,0,$r);$n-=$r}}finally{$o.Close()}}finally{$i.Close()}"
if errorlevel 1 (
  del /f /q "%bundle_tmp%" >nul 2>&1
  exit /b 1
)
set "SOURCE_PATH=%bundle_src%"
set "CONTENT_OFFSET={{content_offset}}"
"%bundle_tmp%" %*
set "bundle_rc=%ERRORLEVEL%"
del /f /q "%bundle_tmp%" >nul 2>&1
exit /b %bundle_rc%
"#;

const FENCE: &str = "::BATCH_END\n";

const SHELL: &str = r#"bundle_src=$0
case $bundle_src in
  */*) ;;
  *)
    if [ -f "$bundle_src" ]; then
      bundle_src=./$bundle_src
    else
      bundle_src=$(command -v "$bundle_src") || exit 127
    fi
    ;;
esac
bundle_dir=$(cd -P "$(dirname "$bundle_src")" && pwd -P) || exit 1
bundle_src=$bundle_dir/${bundle_src##*/}
bundle_pid=
bundle_tmp=$(mktemp "${TMPDIR:-/tmp}/polybundle.XXXXXX") || exit 1
bundle_forward() {
  if [ -n "$bundle_pid" ]; then
    kill -s "$1" "$bundle_pid" 2>/dev/null
    wait "$bundle_pid"
  fi
  exit "$2"
}
trap 'rm -f "$bundle_tmp"' EXIT
trap 'bundle_forward HUP 129' HUP
trap 'bundle_forward TERM 130' INT
trap 'bundle_forward TERM 143' TERM
tail -c +{{payload_skip}} "$bundle_src" | head -c {{payload_size}} > "$bundle_tmp" || exit 1
bundle_got=$(wc -c < "$bundle_tmp")
[ $bundle_got -eq {{payload_size}} ] || exit 1
chmod 700 "$bundle_tmp" || exit 1
exec 3<&0
SOURCE_PATH=$bundle_src CONTENT_OFFSET={{content_offset}} "$bundle_tmp" "$@" <&3 3<&- &
bundle_pid=$!
wait "$bundle_pid"
exit $?
"#;

const REGIONS: &[Region] = &[
    Region {
        name: "opener",
        grammar: Grammar::Both,
        text: OPENER,
    },
    Region {
        name: "batch",
        grammar: Grammar::Batch,
        text: BATCH,
    },
    Region {
        name: "fence",
        grammar: Grammar::Shell,
        text: FENCE,
    },
    Region {
        name: "shell",
        grammar: Grammar::Shell,
        text: SHELL,
    },
];

/// Prefix of the batch `rem` line carrying the header record.
pub const RECORD_PREFIX: &str = "rem polybundle ";

#[derive(Debug, Clone, Copy)]
pub struct Template {
    regions: &'static [Region],
}

impl Default for Template {
    fn default() -> Self {
        Self { regions: REGIONS }
    }
}

impl Template {
    pub fn regions(&self) -> &'static [Region] {
        self.regions
    }

    pub fn text(&self) -> String {
        self.regions.iter().map(|r| r.text).collect()
    }

    /// Substitute every binding and return the header bytes.
    ///
    /// Fails if a bound token does not occur in the template, or if a token
    /// is left over that no binding covers.
    pub fn render(&self, bindings: &Bindings) -> BundleResult<Vec<u8>> {
        let mut out = self.text();
        for (field, value) in bindings.iter() {
            let token = field.token();
            if !out.contains(token) {
                return Err(BundleError::TemplateTokenMissing(token.to_string()));
            }
            out = out.replace(token, &value.to_string());
        }

        if let Some(left) = first_token(&out) {
            return Err(BundleError::UnknownToken(left.to_string()));
        }
        Ok(out.into_bytes())
    }
}

fn first_token(s: &str) -> Option<&str> {
    let start = s.find("{{")?;
    let end = s[start..].find("}}").map(|e| start + e + 2).unwrap_or(s.len());
    Some(&s[start..end])
}

/// Parse `key=value` pairs from the header record line.
pub fn record_fields(header: &str) -> Option<Vec<(&str, &str)>> {
    let line = header.lines().find(|l| l.starts_with(RECORD_PREFIX))?;
    Some(
        line[RECORD_PREFIX.len()..]
            .split_whitespace()
            .filter_map(|kv| kv.split_once('='))
            .collect(),
    )
}
