//! Line-oriented console standing in for the drawing surface.
//!
//! Every command acts on the selected board at its current version, the same
//! way a canvas would submit an edit against what it last rendered.

use crate::peer::WhiteboardPeer;
use anyhow::Result;
use std::fmt::Write as _;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use whiteboard_core::board::BoardError;
use whiteboard_core::{
    BoardDescriptor, BoardEvent, BoardReplica, MutationOutcome, PeerLink, ReplicaError,
    WhiteboardPath,
};

const HELP: &str = "\
commands:
  new               create a board and select it
  list              list boards (* = selected)
  select <board>    select by descriptor or board id
  share | unshare   publish the selected board through the index
  draw <path>       append a path to the selected board
  undo | clear      remove the last path / all paths
  delete            delete the selected board
  show              print the selected board
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    List,
    Select(String),
    Share,
    Unshare,
    Draw(String),
    Undo,
    Clear,
    Delete,
    Show,
    Help,
    Quit,
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Unknown command: {0} (try `help`)")]
    UnknownCommand(String),

    #[error("{0} needs an argument")]
    MissingArgument(&'static str),

    #[error("No board matches {0}")]
    NoMatch(String),

    #[error(transparent)]
    Replica(#[from] ReplicaError),

    #[error(transparent)]
    Board(#[from] BoardError),
}

impl FromStr for Command {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let argument = |name: &'static str| {
            if rest.is_empty() {
                Err(ConsoleError::MissingArgument(name))
            } else {
                Ok(rest.to_string())
            }
        };

        match word {
            "new" => Ok(Self::New),
            "list" | "ls" => Ok(Self::List),
            "select" => argument("select").map(Self::Select),
            "share" => Ok(Self::Share),
            "unshare" => Ok(Self::Unshare),
            "draw" => argument("draw").map(Self::Draw),
            "undo" => Ok(Self::Undo),
            "clear" => Ok(Self::Clear),
            "delete" => Ok(Self::Delete),
            "show" => Ok(Self::Show),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ConsoleError::UnknownCommand(other.to_string())),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Output(String),
    Quit,
}

/// Run one command against the replica.
pub fn execute<P: PeerLink>(replica: &BoardReplica<P>, command: Command) -> Result<Reply, ConsoleError> {
    let output = match command {
        Command::New => format!("created {}", replica.create_board()?),
        Command::List => list(replica),
        Command::Select(name) => {
            let descriptor = find(replica, &name)?;
            replica.select_board(&descriptor)?;
            format!("selected {}", descriptor)
        }
        Command::Share | Command::Unshare => {
            let descriptor = selected(replica)?;
            let shared = command == Command::Share;
            replica.set_shared(&descriptor, shared)?;
            format!("{} {}", if shared { "shared" } else { "unshared" }, descriptor)
        }
        Command::Draw(data) => {
            let descriptor = selected(replica)?;
            let path = WhiteboardPath::new(&data)?;
            let outcome = replica.append_path(&descriptor, path, current_version(replica, &descriptor)?)?;
            describe(outcome)
        }
        Command::Undo => {
            let descriptor = selected(replica)?;
            describe(replica.undo(&descriptor, current_version(replica, &descriptor)?)?)
        }
        Command::Clear => {
            let descriptor = selected(replica)?;
            describe(replica.clear(&descriptor, current_version(replica, &descriptor)?)?)
        }
        Command::Delete => {
            let descriptor = selected(replica)?;
            replica.delete_board(&descriptor)?;
            format!("deleted {}", descriptor)
        }
        Command::Show => {
            let descriptor = selected(replica)?;
            let snapshot = replica
                .snapshot(&descriptor)
                .ok_or_else(|| ReplicaError::UnknownBoard(descriptor.to_string()))?;
            let mut out = format!("{} v{}", snapshot.descriptor, snapshot.version);
            for (i, path) in snapshot.paths.iter().enumerate() {
                let _ = write!(out, "\n  {:>3} {}", i + 1, path);
            }
            out
        }
        Command::Help => HELP.to_string(),
        Command::Quit => return Ok(Reply::Quit),
    };
    Ok(Reply::Output(output))
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run(peer: Arc<WhiteboardPeer>) -> Result<()> {
    let _redraw = peer.replica().events().subscribe(render);
    println!("peer {} ready, `help` for commands", peer.replica().local_address());

    let mut lines = stdin_lines();
    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        let reply = line
            .parse::<Command>()
            .and_then(|command| execute(peer.replica(), command));
        match reply {
            Ok(Reply::Output(text)) => println!("{}", text),
            Ok(Reply::Quit) => break,
            Err(e) => println!("error: {}", e),
        }
    }
    Ok(())
}

/// Stdin is read on a detached thread: a blocking read on the runtime's
/// pool would hold up shutdown until the next line arrives.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn render(event: BoardEvent) {
    match event {
        BoardEvent::Changed { descriptor, version } => println!("~ {} v{}", descriptor, version),
        BoardEvent::Removed { descriptor } => println!("~ {} removed", descriptor),
        BoardEvent::Rejected { descriptor, version } => {
            println!("~ {} edit rejected, board is at v{}", descriptor, version)
        }
    }
}

fn list<P: PeerLink>(replica: &BoardReplica<P>) -> String {
    let boards = replica.boards();
    if boards.is_empty() {
        return "no boards".to_string();
    }
    let selected = replica.selected();
    let mut out = String::new();
    for board in boards {
        let marker = if selected.as_ref() == Some(&board.descriptor) { '*' } else { ' ' };
        let _ = write!(
            out,
            "{}{} v{} {} path(s)",
            marker, board.descriptor, board.version, board.paths
        );
        if board.shared {
            out.push_str(" shared");
        }
        if board.remote {
            out.push_str(" remote");
        }
        out.push('\n');
    }
    out.pop();
    out
}

fn find<P: PeerLink>(replica: &BoardReplica<P>, name: &str) -> Result<BoardDescriptor, ConsoleError> {
    replica
        .boards()
        .into_iter()
        .map(|board| board.descriptor)
        .find(|d| d.to_string() == name || d.board_id() == name)
        .ok_or_else(|| ConsoleError::NoMatch(name.to_string()))
}

fn selected<P: PeerLink>(replica: &BoardReplica<P>) -> Result<BoardDescriptor, ReplicaError> {
    replica.selected().ok_or(ReplicaError::NoSelection)
}

fn current_version<P: PeerLink>(replica: &BoardReplica<P>, descriptor: &BoardDescriptor) -> Result<u64, ReplicaError> {
    replica
        .snapshot(descriptor)
        .map(|snapshot| snapshot.version)
        .ok_or_else(|| ReplicaError::UnknownBoard(descriptor.to_string()))
}

fn describe(outcome: MutationOutcome) -> String {
    match outcome {
        MutationOutcome::Applied(version) => format!("now at v{}", version),
        MutationOutcome::Forwarded => "sent to owner".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;

    fn replica() -> BoardReplica<Endpoint> {
        BoardReplica::new("127.0.0.1", 3200)
    }

    fn run_line(replica: &BoardReplica<Endpoint>, line: &str) -> Result<Reply, ConsoleError> {
        execute(replica, line.parse()?)
    }

    fn output(replica: &BoardReplica<Endpoint>, line: &str) -> String {
        match run_line(replica, line).unwrap() {
            Reply::Output(text) => text,
            Reply::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("new".parse::<Command>().unwrap(), Command::New);
        assert_eq!("  ls ".parse::<Command>().unwrap(), Command::List);
        assert_eq!(
            "draw M0,0 L10,10".parse::<Command>().unwrap(),
            Command::Draw("M0,0 L10,10".to_string())
        );
        assert!(matches!(
            "draw".parse::<Command>(),
            Err(ConsoleError::MissingArgument("draw"))
        ));
        assert!(matches!(
            "paint".parse::<Command>(),
            Err(ConsoleError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_draw_undo_clear_cycle() {
        let replica = replica();
        assert!(output(&replica, "new").starts_with("created 127.0.0.1:3200:board"));

        assert_eq!(output(&replica, "draw M0,0L5,5"), "now at v1");
        assert_eq!(output(&replica, "draw M1,1L2,2"), "now at v2");
        assert_eq!(output(&replica, "undo"), "now at v3");
        assert_eq!(output(&replica, "clear"), "now at v4");

        let shown = output(&replica, "show");
        assert!(shown.ends_with(" v4"), "{}", shown);
    }

    #[test]
    fn test_show_lists_paths() {
        let replica = replica();
        output(&replica, "new");
        output(&replica, "draw A");
        output(&replica, "draw B");

        let shown = output(&replica, "show");
        let lines: Vec<_> = shown.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("A"));
        assert!(lines[2].ends_with("B"));
    }

    #[test]
    fn test_commands_need_selection() {
        let replica = replica();
        assert!(matches!(
            run_line(&replica, "draw A"),
            Err(ConsoleError::Replica(ReplicaError::NoSelection))
        ));
        assert_eq!(output(&replica, "list"), "no boards");
    }

    #[test]
    fn test_invalid_path_rejected() {
        let replica = replica();
        output(&replica, "new");
        assert!(matches!(run_line(&replica, "draw a%b"), Err(ConsoleError::Board(_))));
    }

    #[test]
    fn test_select_by_board_id_and_list_marker() {
        let replica = replica();
        let first = replica.create_board().unwrap();
        let second = replica.create_board().unwrap();
        assert_eq!(replica.selected(), Some(second.clone()));

        output(&replica, &format!("select {}", first.board_id()));
        assert_eq!(replica.selected(), Some(first.clone()));

        let listing = output(&replica, "list");
        assert!(listing.lines().any(|l| l.starts_with(&format!("*{}", first))));
        assert!(listing.lines().any(|l| l.starts_with(&format!(" {}", second))));
        assert!(matches!(
            run_line(&replica, "select nope"),
            Err(ConsoleError::NoMatch(_))
        ));
    }

    #[test]
    fn test_share_without_index_and_delete() {
        let replica = replica();
        output(&replica, "new");
        assert!(output(&replica, "share").starts_with("shared "));
        assert!(output(&replica, "list").contains(" shared"));

        assert!(output(&replica, "delete").starts_with("deleted "));
        assert!(replica.boards().is_empty());
        assert_eq!(run_line(&replica, "quit").unwrap(), Reply::Quit);
    }
}
