use clap::{Parser, ValueEnum};
use codesnake::{Block, CodeWidth, Label, LineIndex};
use hbsc::{CompileFlags, Error, Span, Token, TokenKind};
use yansi::Paint;

/// Look at what hbsc makes of a template
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Which stage to run
    #[arg(value_enum, default_value_t = Stage::Compile)]
    stage: Stage,
    /// Run once on this template instead of starting a prompt
    template: Option<String>,
    /// Compile flag, may be given more than once
    #[arg(long = "flag", value_enum)]
    flags: Vec<Flag>,
    /// Helper name the compiler may bind statically
    #[arg(long = "known-helper")]
    known_helpers: Vec<String>,
    /// Log what the lexer, parser and compiler are doing to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Lex,
    Parse,
    Compile,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Flag {
    UseDepths,
    StringParams,
    TrackIds,
    Compat,
    KnownHelpersOnly,
    All,
}

impl From<Flag> for CompileFlags {
    fn from(flag: Flag) -> Self {
        match flag {
            Flag::UseDepths => CompileFlags::USE_DEPTHS,
            Flag::StringParams => CompileFlags::STRING_PARAMS,
            Flag::TrackIds => CompileFlags::TRACK_IDS,
            Flag::Compat => CompileFlags::COMPAT,
            Flag::KnownHelpersOnly => CompileFlags::KNOWN_HELPERS_ONLY,
            Flag::All => CompileFlags::ALL,
        }
    }
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let level = match record.level() {
            log::Level::Error => record.level().red().to_string(),
            log::Level::Warn => record.level().yellow().to_string(),
            _ => record.level().dim().to_string(),
        };
        eprintln!("{level} {}: {}", record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn token_label(token: &Token) -> Label<Span, String> {
    let text = format!("{} {:?}", token.kind, token.text);
    let kind = token.kind;
    Label::new(token.span.clone())
        .with_text(match kind {
            TokenKind::Invalid(_) => text.red().to_string(),
            _ => text.green().to_string(),
        })
        .with_style(move |s| match kind {
            TokenKind::Id => s.blue().to_string(),
            TokenKind::String | TokenKind::Number | TokenKind::Boolean => s.cyan().to_string(),
            TokenKind::Invalid(_) => s.red().to_string(),
            _ => s.yellow().to_string(),
        })
}

/// Labels can not be empty, so an error at the very end points at the last
/// character instead
fn error_span(src: &str, span: Span) -> Option<Span> {
    if !span.is_empty() {
        return Some(span);
    }
    let (start, _) = src[..span.start.min(src.len())].char_indices().last()?;
    Some(start..span.start)
}

fn print_block(src: &str, labels: Vec<Label<Span, String>>) -> bool {
    let idx = LineIndex::new(src);
    let Some(block) = Block::new(&idx, labels) else {
        return false;
    };
    let block = block.map_code(|c| CodeWidth::new(c, c.len()));
    println!("{}[template]", block.prologue());
    print!("{block}");
    println!("{}", block.epilogue());
    true
}

fn report(src: &str, err: &Error) {
    println!("{}: {err}", err.kind().red().bold());
    if let Some(span) = err.span().and_then(|span| error_span(src, span)) {
        let label = Label::new(span)
            .with_text(err.message().red().to_string())
            .with_style(|s| s.red().to_string());
        print_block(src, vec![label]);
    }
}

fn run(args: &Args, flags: CompileFlags, src: &str) {
    let helpers: Vec<&str> = args.known_helpers.iter().map(String::as_str).collect();
    let result = match args.stage {
        Stage::Lex => {
            let labels = hbsc::lex(src)
                .iter()
                .filter(|token| token.kind != TokenKind::Content)
                .map(token_label)
                .collect();
            if !print_block(src, labels) {
                println!("{}", hbsc::lex_print(src));
            }
            return;
        }
        Stage::Parse => hbsc::parse_print(src),
        Stage::Compile => hbsc::compile_print(src, flags, &helpers),
    };

    match result {
        Ok(printed) => print!("{printed}"),
        Err(err) => report(src, &err),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.verbose {
        log::set_logger(&LOGGER)?;
        log::set_max_level(log::LevelFilter::Trace);
    }
    let flags = args
        .flags
        .iter()
        .fold(CompileFlags::NONE, |flags, flag| flags | CompileFlags::from(*flag));

    if let Some(template) = &args.template {
        run(&args, flags, template);
        return Ok(());
    }

    println!("hbsc {} ({:?} mode)", hbsc::version(), args.stage);
    let mut readline = rustyline::DefaultEditor::new()?;
    while let Ok(input) = readline.readline(">> ") {
        readline.add_history_entry(input.as_str())?;
        // `\n` lets a single prompt line hold a multi-line template
        let src = input.replace(r"\n", "\n");
        run(&args, flags, &src);
    }

    Ok(())
}
