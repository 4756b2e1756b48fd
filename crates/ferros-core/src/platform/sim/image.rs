//! Program image for the simulated target.
//!
//! An image is a tiny, fully deterministic stand-in for an executable plus its
//! debug info: a line table, function entries, named variables, and one
//! execution trace per thread. It can be written by hand in TOML:
//!
//! ```toml
//! exit_code = 0
//!
//! [[functions]]
//! name = "main.main"
//! file = "main.go"
//! entry = 0x401000
//!
//! [[lines]]
//! address = 0x401000
//! file = "main.go"
//! line = 10
//! function = "main.main"
//!
//! [[threads]]
//! id = 1
//! trace = [0x401000]
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::breakpoints::BreakpointSite;
use crate::error::{FerrosError, FerrosResult};
use crate::handle::SymbolResolver;
use crate::types::{Address, SourceLine, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSymbol
{
    pub name: String,
    pub file: String,
    pub entry: Address,
}

/// One row of the line table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEntry
{
    pub address: Address,
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub function: Option<String>,
    /// Call depth, used to step over calls.
    #[serde(default)]
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope
{
    #[default]
    Package,
    Arg,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable
{
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub scope: VariableScope,
    /// Owning function for args and locals.
    #[serde(default)]
    pub function: Option<String>,
}

/// Execution trace of one thread: the addresses it visits, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadTrace
{
    pub id: ThreadId,
    pub trace: Vec<Address>,
}

/// Executable and debug info of a simulated program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramImage
{
    #[serde(default)]
    pub exit_code: u32,
    /// Number of hardware breakpoint slots; later breakpoints are software.
    #[serde(default)]
    pub hardware_slots: usize,
    #[serde(default)]
    pub functions: Vec<FunctionSymbol>,
    #[serde(default)]
    pub lines: Vec<LineEntry>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    pub threads: Vec<ThreadTrace>,
}

impl ProgramImage
{
    /// Parse and validate an image from TOML.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: malformed TOML, no threads, or an empty trace
    pub fn from_toml_str(text: &str) -> FerrosResult<Self>
    {
        let image: Self =
            toml::from_str(text).map_err(|err| FerrosError::InvalidArgument(format!("invalid program image: {err}")))?;
        image.validate()?;
        Ok(image)
    }

    /// Read an image from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> FerrosResult<Self>
    {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> FerrosResult<()>
    {
        if self.threads.is_empty() {
            return Err(FerrosError::InvalidArgument("program image has no threads".to_string()));
        }
        if let Some(thread) = self.threads.iter().find(|t| t.trace.is_empty()) {
            return Err(FerrosError::InvalidArgument(format!(
                "thread {} has an empty trace",
                thread.id
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn line_at(&self, address: Address) -> Option<&LineEntry>
    {
        self.lines.iter().find(|entry| entry.address == address)
    }

    /// Name of the function containing `address`, if known.
    #[must_use]
    pub fn function_at(&self, address: Address) -> Option<&str>
    {
        self.line_at(address).and_then(|entry| entry.function.as_deref())
    }

    /// A small two-thread Go-style program, used when no image is given.
    ///
    /// `main.main` calls `main.add` on line 12 of `main.go`; a worker
    /// goroutine runs `main.worker`. The process exits with status 0.
    #[must_use]
    pub fn demo() -> Self
    {
        fn line(address: u64, file: &str, line: u32, function: &str, depth: u32) -> LineEntry
        {
            LineEntry {
                address: Address::new(address),
                file: file.to_string(),
                line,
                function: Some(function.to_string()),
                depth,
            }
        }

        fn var(name: &str, value: &str, scope: VariableScope, function: Option<&str>) -> Variable
        {
            Variable {
                name: name.to_string(),
                value: value.to_string(),
                scope,
                function: function.map(str::to_string),
            }
        }

        let trace = |addresses: &[u64]| -> Vec<Address> { addresses.iter().copied().map(Address::new).collect() };

        Self {
            exit_code: 0,
            hardware_slots: 0,
            functions: vec![
                FunctionSymbol {
                    name: "main.main".to_string(),
                    file: "main.go".to_string(),
                    entry: Address::new(0x40_1000),
                },
                FunctionSymbol {
                    name: "main.add".to_string(),
                    file: "helpers.go".to_string(),
                    entry: Address::new(0x40_2000),
                },
                FunctionSymbol {
                    name: "main.worker".to_string(),
                    file: "main.go".to_string(),
                    entry: Address::new(0x40_1100),
                },
            ],
            lines: vec![
                line(0x40_1000, "main.go", 10, "main.main", 0),
                line(0x40_1008, "main.go", 11, "main.main", 0),
                line(0x40_1010, "main.go", 12, "main.main", 0),
                line(0x40_1018, "main.go", 13, "main.main", 0),
                line(0x40_1020, "main.go", 14, "main.main", 0),
                line(0x40_1100, "main.go", 20, "main.worker", 0),
                line(0x40_1108, "main.go", 21, "main.worker", 0),
                line(0x40_1110, "main.go", 22, "main.worker", 0),
                line(0x40_2000, "helpers.go", 3, "main.add", 1),
                line(0x40_2008, "helpers.go", 4, "main.add", 1),
                line(0x40_2010, "helpers.go", 5, "main.add", 1),
            ],
            variables: vec![
                var("version", "\"1.0.0\"", VariableScope::Package, None),
                var("x", "1", VariableScope::Local, Some("main.main")),
                var("y", "3", VariableScope::Local, Some("main.main")),
                var("a", "1", VariableScope::Arg, Some("main.add")),
                var("b", "2", VariableScope::Arg, Some("main.add")),
                var("sum", "3", VariableScope::Local, Some("main.add")),
                var("jobs", "4", VariableScope::Local, Some("main.worker")),
            ],
            threads: vec![
                ThreadTrace {
                    id: ThreadId(1),
                    trace: trace(&[
                        0x40_1000, 0x40_1008, 0x40_1010, 0x40_2000, 0x40_2008, 0x40_2010, 0x40_1018, 0x40_1020,
                    ]),
                },
                ThreadTrace {
                    id: ThreadId(2),
                    trace: trace(&[0x40_1100, 0x40_1108, 0x40_1110]),
                },
            ],
        }
    }
}

/// `file` names the same source as `query`, either exactly or by path suffix.
fn same_file(file: &str, query: &str) -> bool
{
    file == query || file.ends_with(&format!("/{query}")) || query.ends_with(&format!("/{file}"))
}

impl SymbolResolver for ProgramImage
{
    fn resolve_location(&self, location: &str) -> FerrosResult<BreakpointSite>
    {
        let location = location.trim();

        if let Some((file, line)) = location.rsplit_once(':') {
            if let Ok(line) = line.parse::<u32>() {
                let entry = self
                    .lines
                    .iter()
                    .filter(|entry| entry.line == line && same_file(&entry.file, file))
                    .min_by_key(|entry| entry.address)
                    .ok_or_else(|| FerrosError::Resolution(location.to_string()))?;
                return Ok(BreakpointSite {
                    address: entry.address,
                    file: entry.file.clone(),
                    line: entry.line,
                    function: entry.function.clone(),
                });
            }
        }

        let function = self
            .functions
            .iter()
            .find(|function| function.name == location)
            .ok_or_else(|| FerrosError::Resolution(location.to_string()))?;
        let line = self.line_at(function.entry).map_or(0, |entry| entry.line);
        Ok(BreakpointSite {
            address: function.entry,
            file: function.file.clone(),
            line,
            function: Some(function.name.clone()),
        })
    }

    fn location_for_pc(&self, pc: Address) -> Option<SourceLine>
    {
        self.line_at(pc).map(|entry| SourceLine {
            file: entry.file.clone(),
            line: entry.line,
            function: entry.function.clone(),
        })
    }

    fn source_files(&self) -> Vec<String>
    {
        let files: BTreeSet<&str> = self
            .lines
            .iter()
            .map(|entry| entry.file.as_str())
            .chain(self.functions.iter().map(|function| function.file.as_str()))
            .collect();
        files.into_iter().map(str::to_string).collect()
    }

    fn functions(&self) -> Vec<String>
    {
        let mut names: Vec<String> = self.functions.iter().map(|function| function.name.clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_resolve_file_line_and_function()
    {
        let image = ProgramImage::demo();

        let site = image.resolve_location("main.go:12").unwrap();
        assert_eq!(site.address, Address::new(0x40_1010));
        assert_eq!(site.function.as_deref(), Some("main.main"));

        let site = image.resolve_location("/home/me/project/main.go:10").unwrap();
        assert_eq!(site.address, Address::new(0x40_1000));

        let site = image.resolve_location("main.add").unwrap();
        assert_eq!(site.address, Address::new(0x40_2000));
        assert_eq!(site.file, "helpers.go");
        assert_eq!(site.line, 3);
    }

    #[test]
    fn test_unresolvable_locations()
    {
        let image = ProgramImage::demo();
        for location in ["main.go:99", "nope.go:10", "main.missing", ""] {
            assert!(matches!(image.resolve_location(location), Err(FerrosError::Resolution(_))));
        }
    }

    #[test]
    fn test_source_files_are_sorted_and_unique()
    {
        assert_eq!(ProgramImage::demo().source_files(), vec!["helpers.go", "main.go"]);
    }

    #[test]
    fn test_from_toml()
    {
        let text = r#"
            exit_code = 3

            [[functions]]
            name = "main.main"
            file = "main.go"
            entry = 0x1000

            [[lines]]
            address = 0x1000
            file = "main.go"
            line = 5
            function = "main.main"

            [[variables]]
            name = "x"
            value = "7"
            scope = "local"
            function = "main.main"

            [[threads]]
            id = 1
            trace = [0x1000]
        "#;
        let image = ProgramImage::from_toml_str(text).unwrap();
        assert_eq!(image.exit_code, 3);
        assert_eq!(image.variables[0].scope, VariableScope::Local);
        assert_eq!(image.resolve_location("main.go:5").unwrap().address, Address::new(0x1000));
    }

    #[test]
    fn test_image_without_threads_is_rejected()
    {
        let err = ProgramImage::from_toml_str("exit_code = 0\nthreads = []").unwrap_err();
        assert!(matches!(err, FerrosError::InvalidArgument(_)));
    }
}
