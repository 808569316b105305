/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Templates,
    /// 1-based template index.
    Start(usize),
    Restart,
    People,
    /// Show the newest `n` debug entries.
    Debug(usize),
    DebugClear,
    Reset,
    Help,
    Quit,
    Say(String),
    Unknown(String),
}

pub const DEFAULT_DEBUG_COUNT: usize = 5;

pub const HELP: &str = "\
/templates     list scenario templates
/start <n>     start a scenario from template n
/restart       new scenario from the current template
/people        show everyone in the scene
/debug [n]     show the newest n debug entries
/debug clear   empty the debug log
/reset         drop the current scenario
/quit          exit
anything else is said to the scene";

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let text = line.trim();
        if text.is_empty() {
            return None;
        }
        if !text.starts_with('/') {
            return Some(Self::Say(text.to_owned()));
        }
        let mut parts = text.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        let cmd = match name {
            "/templates" | "/t" => Self::Templates,
            "/start" | "/s" => match arg.and_then(|a| a.parse::<usize>().ok()) {
                Some(n) if n > 0 => Self::Start(n),
                _ => Self::Unknown(text.to_owned()),
            },
            "/restart" | "/new" => Self::Restart,
            "/people" | "/p" => Self::People,
            "/debug" | "/d" => match arg {
                None => Self::Debug(DEFAULT_DEBUG_COUNT),
                Some("clear") => Self::DebugClear,
                Some(a) => match a.parse::<usize>() {
                    Ok(n) => Self::Debug(n),
                    Err(_) => Self::Unknown(text.to_owned()),
                },
            },
            "/reset" => Self::Reset,
            "/help" | "/h" | "/?" => Self::Help,
            "/q" | "/exit" | "/quit" => Self::Quit,
            _ => Self::Unknown(text.to_owned()),
        };
        Some(cmd)
    }
}
