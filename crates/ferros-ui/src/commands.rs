//! Command registry and handlers.
//!
//! A typed line is split on whitespace; the first word selects a handler by
//! exact alias match, the rest are its arguments. An empty line replays the
//! last dispatched command with the same arguments.
//!
//! Handlers never query the server. They send fire-and-forget commands and
//! read the [`Cache`], whose contents only change when events arrive.

use std::io::Write;
use std::sync::Arc;

use ferros_core::command::Command;
use ferros_core::handle::{Evaluator, InfoKind};
use ferros_core::types::{Address, Breakpoint, Thread, ThreadId};
use ferros_protocol::{Client, ClientError};
use regex::Regex;

use crate::cache::Cache;
use crate::error::{TerminalError, TerminalResult};

/// Where handlers send commands.
pub trait Commander
{
    /// Queue one command; its effects arrive later as events.
    fn send(&self, command: Command) -> Result<(), ClientError>;
}

impl Commander for Client
{
    fn send(&self, command: Command) -> Result<(), ClientError>
    {
        Self::send(self, command)
    }
}

/// Everything a handler may touch.
pub struct Context<'a>
{
    pub client: &'a dyn Commander,
    /// Snapshot taken when the command was dispatched.
    pub cache: &'a Cache,
    pub evaluator: Option<&'a Arc<dyn Evaluator>>,
    pub out: &'a mut dyn Write,
}

impl Context<'_>
{
    fn evaluator(&self) -> TerminalResult<&Arc<dyn Evaluator>>
    {
        self.evaluator.ok_or(TerminalError::NoEvaluator)
    }

    fn println(&mut self, line: impl AsRef<str>) -> TerminalResult<()>
    {
        writeln!(self.out, "{}", line.as_ref()).map_err(|err| TerminalError::InvalidArgument(err.to_string()))
    }
}

pub type Handler = fn(&mut Context<'_>, &[String]) -> TerminalResult<()>;

#[derive(Clone, Copy)]
enum Action
{
    Help,
    Exit,
    Run(Handler),
}

struct Entry
{
    aliases: Vec<String>,
    help: String,
    action: Action,
}

impl Entry
{
    fn matches(&self, name: &str) -> bool
    {
        self.aliases.iter().any(|alias| alias == name)
    }
}

/// Result of dispatching one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome
{
    Continue,
    Exit,
}

/// Alias table plus the "repeat last command" memory.
pub struct Commands
{
    entries: Vec<Entry>,
    last: Option<(Action, Vec<String>)>,
}

impl Default for Commands
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl Commands
{
    /// The built-in command set.
    #[must_use]
    pub fn new() -> Self
    {
        let mut commands = Self {
            entries: Vec::new(),
            last: None,
        };
        commands.add(&["help"], "Prints the help message.", Action::Help);
        commands.add(
            &["break", "b"],
            "Set break point at the entry point of a function, or at a specific file/line. Example: break foo.go:13",
            Action::Run(breakpoint),
        );
        commands.add(&["continue", "c"], "Run until breakpoint or program termination.", Action::Run(cont));
        commands.add(&["step", "si"], "Single step through program.", Action::Run(step));
        commands.add(&["next", "n"], "Step over to next source line.", Action::Run(next));
        commands.add(&["threads"], "Print out info for every traced thread.", Action::Run(threads));
        commands.add(&["thread", "t"], "Switch to the specified thread.", Action::Run(thread));
        commands.add(
            &["clear"],
            "Deletes breakpoint. Accepts an address, a breakpoint id, file:line, or a function name.",
            Action::Run(clear),
        );
        commands.add(&["goroutines"], "Print out info for every goroutine.", Action::Run(goroutines));
        commands.add(&["breakpoints", "bp"], "Print out info for active breakpoints.", Action::Run(breakpoints));
        commands.add(&["print", "p"], "Evaluate a variable.", Action::Run(print_var));
        commands.add(
            &["info"],
            "Provides info about args, funcs, locals, sources, or vars. Example: info funcs main\\.",
            Action::Run(info),
        );
        commands.add(&["exit"], "Exit the debugger.", Action::Exit);
        commands
    }

    fn add(&mut self, aliases: &[&str], help: &str, action: Action)
    {
        self.entries.push(Entry {
            aliases: aliases.iter().map(ToString::to_string).collect(),
            help: help.to_string(),
            action,
        });
    }

    /// Add a command, or replace the handler of the command that already
    /// answers to `alias`.
    pub fn register(&mut self, alias: &str, help: &str, handler: Handler)
    {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.matches(alias)) {
            entry.action = Action::Run(handler);
            return;
        }
        self.add(&[alias], help, Action::Run(handler));
    }

    /// Run one input line.
    ///
    /// ## Errors
    ///
    /// - `CommandNotFound`: the first word matches no alias
    /// - whatever the handler returns
    pub fn dispatch(&mut self, line: &str, ctx: &mut Context<'_>) -> TerminalResult<Outcome>
    {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return match self.last.clone() {
                Some((action, args)) => self.perform(action, &args, ctx),
                None => Ok(Outcome::Continue),
            };
        };
        let args: Vec<String> = words.map(str::to_string).collect();

        let action = self
            .entries
            .iter()
            .find(|entry| entry.matches(name))
            .map(|entry| entry.action)
            .ok_or_else(|| TerminalError::CommandNotFound(name.to_string()))?;

        if !matches!(action, Action::Exit) {
            self.last = Some((action, args.clone()));
        }
        self.perform(action, &args, ctx)
    }

    fn perform(&self, action: Action, args: &[String], ctx: &mut Context<'_>) -> TerminalResult<Outcome>
    {
        match action {
            Action::Exit => return Ok(Outcome::Exit),
            Action::Help => self.help(ctx)?,
            Action::Run(handler) => handler(ctx, args)?,
        }
        Ok(Outcome::Continue)
    }

    fn help(&self, ctx: &mut Context<'_>) -> TerminalResult<()>
    {
        ctx.println("The following commands are available:")?;
        for entry in &self.entries {
            ctx.println(format!("\t{} - {}", entry.aliases.join("|"), entry.help))?;
        }
        Ok(())
    }
}

fn first<'a>(args: &'a [String], usage: &'static str) -> TerminalResult<&'a str>
{
    args.first().map(String::as_str).ok_or(TerminalError::NotEnoughArguments(usage))
}

fn require_live(cache: &Cache) -> TerminalResult<()>
{
    if cache.process.exited {
        return Err(TerminalError::ProcessExited {
            status: cache.process.status,
        });
    }
    Ok(())
}

fn breakpoint(ctx: &mut Context<'_>, args: &[String]) -> TerminalResult<()>
{
    let location = first(args, "break <file:line | function>")?;
    ctx.client.send(Command::AddBreakPoint {
        location: location.to_string(),
    })?;
    Ok(())
}

fn cont(ctx: &mut Context<'_>, _args: &[String]) -> TerminalResult<()>
{
    require_live(ctx.cache)?;
    ctx.client.send(Command::Continue)?;
    Ok(())
}

fn step(ctx: &mut Context<'_>, _args: &[String]) -> TerminalResult<()>
{
    require_live(ctx.cache)?;
    ctx.client.send(Command::Step)?;
    Ok(())
}

fn next(ctx: &mut Context<'_>, _args: &[String]) -> TerminalResult<()>
{
    require_live(ctx.cache)?;
    ctx.client.send(Command::Next)?;
    Ok(())
}

fn thread(ctx: &mut Context<'_>, args: &[String]) -> TerminalResult<()>
{
    let raw = first(args, "thread <id>")?;
    let id = raw
        .parse::<u64>()
        .map_err(|_| TerminalError::InvalidArgument(format!("invalid thread id {raw:?}")))?;
    ctx.client.send(Command::SwitchThread { id: ThreadId(id) })?;
    Ok(())
}

fn clear(ctx: &mut Context<'_>, args: &[String]) -> TerminalResult<()>
{
    let location = first(args, "clear <address | id | file:line | function>")?;
    let address = find_breakpoint(&ctx.cache.breakpoints, location)
        .map(|bp| bp.addr)
        .ok_or_else(|| TerminalError::InvalidArgument(format!("no breakpoint at {location}")))?;
    ctx.client.send(Command::Clear { address })?;
    Ok(())
}

/// Match `location` against the cached breakpoints.
fn find_breakpoint<'a>(breakpoints: &'a [Breakpoint], location: &str) -> Option<&'a Breakpoint>
{
    if location.starts_with("0x") {
        let address = location.parse::<Address>().ok()?;
        return breakpoints.iter().find(|bp| bp.addr == address);
    }
    if let Ok(id) = location.parse::<u64>() {
        return breakpoints.iter().find(|bp| bp.id.raw() == id);
    }
    if let Some((file, line)) = location.rsplit_once(':') {
        if let Ok(line) = line.parse::<u32>() {
            return breakpoints
                .iter()
                .find(|bp| bp.line == line && (bp.file == file || bp.file.ends_with(&format!("/{file}"))));
        }
    }
    breakpoints
        .iter()
        .find(|bp| bp.function_name.as_deref() == Some(location))
}

fn breakpoints(ctx: &mut Context<'_>, _args: &[String]) -> TerminalResult<()>
{
    let mut sorted = ctx.cache.breakpoints.clone();
    sorted.sort_by_key(|bp| bp.id);
    for bp in &sorted {
        ctx.println(format_breakpoint(bp))?;
    }
    Ok(())
}

fn format_breakpoint(bp: &Breakpoint) -> String
{
    format!(
        "Breakpoint {} at {} {} {}:{}",
        bp.id,
        bp.addr,
        bp.function_name.as_deref().unwrap_or("?"),
        bp.file,
        bp.line
    )
}

fn threads(ctx: &mut Context<'_>, _args: &[String]) -> TerminalResult<()>
{
    let cache = ctx.cache;
    for thread in &cache.threads {
        ctx.println(format_thread(thread))?;
    }
    Ok(())
}

fn format_thread(thread: &Thread) -> String
{
    let prefix = if thread.is_current { "* " } else { "  " };
    match &thread.current_line {
        Some(line) => format!(
            "{prefix}Thread {} at {} {}:{} {}",
            thread.id,
            thread.current_pc,
            line.file,
            line.line,
            line.function.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string(),
        None => format!("{prefix}Thread {} at {}", thread.id, thread.current_pc),
    }
}

fn goroutines(ctx: &mut Context<'_>, _args: &[String]) -> TerminalResult<()>
{
    let lines = ctx.evaluator()?.goroutines(&ctx.cache.threads);
    for line in lines {
        ctx.println(line)?;
    }
    Ok(())
}

fn print_var(ctx: &mut Context<'_>, args: &[String]) -> TerminalResult<()>
{
    if args.is_empty() {
        return Err(TerminalError::NotEnoughArguments("print <expression>"));
    }
    let expression = args.join(" ");
    let value = ctx.evaluator()?.evaluate(&expression, ctx.cache.current_pc())?;
    ctx.println(value)
}

fn info(ctx: &mut Context<'_>, args: &[String]) -> TerminalResult<()>
{
    let kind: InfoKind = first(args, "info <args|funcs|locals|sources|vars> [regex]")?.parse()?;
    let filter = args
        .get(1)
        .map(|pattern| Regex::new(pattern))
        .transpose()
        .map_err(|err| TerminalError::InvalidArgument(format!("invalid filter argument: {err}")))?;

    let mut data = match kind {
        // The file list travels with every process snapshot.
        InfoKind::Sources => ctx.cache.process.files.clone(),
        _ => ctx.evaluator()?.info(kind, ctx.cache.current_pc())?,
    };
    if let Some(filter) = &filter {
        data.retain(|entry| filter.is_match(symbol_name(entry)));
    }
    data.sort();

    for entry in data {
        ctx.println(entry)?;
    }
    Ok(())
}

/// The name part of a `name = value` listing entry.
fn symbol_name(entry: &str) -> &str
{
    entry.split_once(" = ").map_or(entry, |(name, _)| name)
}

#[cfg(test)]
mod tests
{
    use std::cell::RefCell;

    use ferros_core::breakpoints::BreakpointId;
    use ferros_core::platform::sim::{ImageEvaluator, ProgramImage};
    use ferros_core::types::{Process, SourceLine};

    use super::*;

    #[derive(Default)]
    struct Recorder
    {
        sent: RefCell<Vec<Command>>,
    }

    impl Commander for Recorder
    {
        fn send(&self, command: Command) -> Result<(), ClientError>
        {
            self.sent.borrow_mut().push(command);
            Ok(())
        }
    }

    struct Fixture
    {
        commands: Commands,
        recorder: Recorder,
        cache: Cache,
        evaluator: Option<Arc<dyn Evaluator>>,
        out: Vec<u8>,
    }

    impl Fixture
    {
        fn new() -> Self
        {
            Self {
                commands: Commands::new(),
                recorder: Recorder::default(),
                cache: Cache::default(),
                evaluator: Some(Arc::new(ImageEvaluator::new(Arc::new(ProgramImage::demo())))),
                out: Vec::new(),
            }
        }

        fn run(&mut self, line: &str) -> TerminalResult<Outcome>
        {
            let mut ctx = Context {
                client: &self.recorder,
                cache: &self.cache,
                evaluator: self.evaluator.as_ref(),
                out: &mut self.out,
            };
            self.commands.dispatch(line, &mut ctx)
        }

        fn sent(&self) -> Vec<Command>
        {
            self.recorder.sent.borrow().clone()
        }

        fn output(&mut self) -> Vec<String>
        {
            let text = String::from_utf8(std::mem::take(&mut self.out)).unwrap();
            text.lines().map(str::to_string).collect()
        }
    }

    fn bp(id: u64, file: &str, line: u32, addr: u64, function: &str) -> Breakpoint
    {
        Breakpoint {
            id: BreakpointId::from_raw(id),
            function_name: Some(function.to_string()),
            file: file.to_string(),
            line,
            addr: Address::new(addr),
            temporary: false,
        }
    }

    #[test]
    fn test_aliases_reach_the_same_handler()
    {
        let mut fx = Fixture::new();
        fx.run("continue").unwrap();
        fx.run("c").unwrap();
        fx.run("n").unwrap();
        fx.run("si").unwrap();
        assert_eq!(fx.sent(), vec![Command::Continue, Command::Continue, Command::Next, Command::Step]);
    }

    #[test]
    fn test_empty_line_repeats_last_command_with_arguments()
    {
        let mut fx = Fixture::new();
        assert_eq!(fx.run("").unwrap(), Outcome::Continue);
        assert!(fx.sent().is_empty());

        fx.run("break foo.go:5").unwrap();
        fx.run("").unwrap();
        fx.run("   ").unwrap();

        let expected = Command::AddBreakPoint {
            location: "foo.go:5".to_string(),
        };
        assert_eq!(fx.sent(), vec![expected.clone(), expected.clone(), expected]);
    }

    #[test]
    fn test_unknown_command_is_reported()
    {
        let mut fx = Fixture::new();
        fx.run("step").unwrap();
        let err = fx.run("frobnicate now").unwrap_err();
        assert!(matches!(err, TerminalError::CommandNotFound(ref name) if name == "frobnicate"));

        // The last good command is still the one repeated.
        fx.run("").unwrap();
        assert_eq!(fx.sent(), vec![Command::Step, Command::Step]);
    }

    #[test]
    fn test_exit_is_not_repeated()
    {
        let mut fx = Fixture::new();
        fx.run("next").unwrap();
        assert_eq!(fx.run("exit").unwrap(), Outcome::Exit);
        assert_eq!(fx.run("").unwrap(), Outcome::Continue);
        assert_eq!(fx.sent(), vec![Command::Next, Command::Next]);
    }

    #[test]
    fn test_resume_after_exit_is_refused_locally()
    {
        let mut fx = Fixture::new();
        fx.cache.process = Process {
            files: vec![],
            status: 137,
            exited: true,
        };
        for line in ["continue", "step", "next"] {
            assert!(matches!(fx.run(line), Err(TerminalError::ProcessExited { status: 137 })));
        }
        assert!(fx.sent().is_empty());
    }

    #[test]
    fn test_missing_arguments()
    {
        let mut fx = Fixture::new();
        assert!(matches!(fx.run("break"), Err(TerminalError::NotEnoughArguments(_))));
        assert!(matches!(fx.run("thread"), Err(TerminalError::NotEnoughArguments(_))));
        assert!(matches!(fx.run("thread two"), Err(TerminalError::InvalidArgument(_))));
    }

    #[test]
    fn test_breakpoints_sorted_by_id()
    {
        let mut fx = Fixture::new();
        fx.cache.breakpoints = vec![
            bp(3, "helpers.go", 3, 0x40_2000, "main.add"),
            bp(1, "main.go", 10, 0x40_1000, "main.main"),
        ];
        fx.run("bp").unwrap();
        assert_eq!(
            fx.output(),
            vec![
                "Breakpoint 1 at 0x401000 main.main main.go:10",
                "Breakpoint 3 at 0x402000 main.add helpers.go:3"
            ]
        );
    }

    #[test]
    fn test_threads_mark_current()
    {
        let mut fx = Fixture::new();
        fx.cache.threads = vec![
            Thread {
                id: ThreadId(1),
                status: 0,
                current_pc: Address::new(0x40_1000),
                current_line: Some(SourceLine {
                    file: "main.go".into(),
                    line: 10,
                    function: Some("main.main".into()),
                }),
                is_current: true,
            },
            Thread {
                id: ThreadId(2),
                status: 0,
                current_pc: Address::new(0xdead),
                current_line: None,
                is_current: false,
            },
        ];
        fx.run("threads").unwrap();
        assert_eq!(
            fx.output(),
            vec!["* Thread 1 at 0x401000 main.go:10 main.main", "  Thread 2 at 0xdead"]
        );
    }

    #[test]
    fn test_clear_resolves_against_cache()
    {
        let mut fx = Fixture::new();
        fx.cache.breakpoints = vec![
            bp(1, "src/main.go", 10, 0x40_1000, "main.main"),
            bp(2, "helpers.go", 3, 0x40_2000, "main.add"),
        ];

        fx.run("clear main.go:10").unwrap();
        fx.run("clear 2").unwrap();
        fx.run("clear 0x401000").unwrap();
        fx.run("clear main.add").unwrap();
        assert!(matches!(fx.run("clear main.go:99"), Err(TerminalError::InvalidArgument(_))));

        let addresses: Vec<_> = fx
            .sent()
            .into_iter()
            .map(|command| match command {
                Command::Clear { address } => address.value(),
                other => panic!("unexpected command {other:?}"),
            })
            .collect();
        assert_eq!(addresses, vec![0x40_1000, 0x40_2000, 0x40_1000, 0x40_2000]);
    }

    #[test]
    fn test_info_filters_and_sorts()
    {
        let mut fx = Fixture::new();
        fx.cache.process.files = vec!["main.go".into(), "helpers.go".into()];

        fx.run("info sources").unwrap();
        assert_eq!(fx.output(), vec!["helpers.go", "main.go"]);

        fx.run("info funcs ^main\\.[am]").unwrap();
        assert_eq!(fx.output(), vec!["main.add", "main.main"]);

        assert!(matches!(fx.run("info registers"), Err(TerminalError::Debugger(_))));
        assert!(matches!(fx.run("info funcs ("), Err(TerminalError::InvalidArgument(_))));
    }

    #[test]
    fn test_print_uses_current_thread_scope()
    {
        let mut fx = Fixture::new();
        fx.cache.threads = vec![Thread {
            id: ThreadId(1),
            status: 0,
            current_pc: Address::new(0x40_2008),
            current_line: None,
            is_current: true,
        }];
        fx.run("p sum").unwrap();
        assert_eq!(fx.output(), vec!["3"]);

        fx.evaluator = None;
        assert!(matches!(fx.run("p sum"), Err(TerminalError::NoEvaluator)));
    }

    #[test]
    fn test_register_replaces_existing_alias()
    {
        fn quiet(_ctx: &mut Context<'_>, _args: &[String]) -> TerminalResult<()>
        {
            Ok(())
        }

        let mut fx = Fixture::new();
        fx.commands.register("c", "Does nothing.", quiet);
        fx.commands.register("noop", "Does nothing.", quiet);
        fx.run("continue").unwrap();
        fx.run("noop").unwrap();
        assert!(fx.sent().is_empty());

        fx.run("help").unwrap();
        let help = fx.output();
        assert_eq!(help[0], "The following commands are available:");
        assert!(help.contains(&"\tbreak|b - Set break point at the entry point of a function, or at a specific file/line. Example: break foo.go:13".to_string()));
        assert!(help.contains(&"\tnoop - Does nothing.".to_string()));
    }
}
