//! Command types and parsing.

use std::fmt;

use crate::library::{
    SAVED_ALBUMS_QUERY, SAVED_TRACKS_QUERY, USER_PLAYLISTS_QUERY, is_spotify_url,
};

/// Commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Greeting plus the command list.
    Start,

    Help,

    /// Send the Spotify authorization link. `force` re-authorizes even
    /// when a valid token exists.
    Authorize { force: bool },

    /// Redirect URL (or bare code) from the authorization page.
    Code(String),

    /// Download and start tracking a Spotify URL or library keyword.
    Download(String),

    /// Shortcut for downloading the liked songs.
    Liked,

    /// Shortcut for downloading every saved album.
    Albums,

    /// Shortcut for downloading every playlist of the user.
    Playlists,

    /// Sync one tracked query, or all of them.
    Sync(Option<String>),

    /// List tracked queries.
    Tracked,

    /// Stop tracking a query.
    Untrack(String),

    Status,

    Version,
}

impl BotCommand {
    /// Parses a message.
    ///
    /// Besides `prefix`-commands, a message that is only a Spotify link is
    /// read as a download request. Returns `None` for anything else.
    #[must_use]
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let text = text.trim();

        let Some(after_prefix) = text.strip_prefix(prefix) else {
            return is_spotify_url(text).then(|| Self::Download(text.to_owned()));
        };

        let (cmd, args) = match after_prefix.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd, Some(args.trim()).filter(|a| !a.is_empty())),
            None => (after_prefix, None),
        };
        // Group chats address commands as /cmd@bot_name
        let cmd = cmd.split_once('@').map_or(cmd, |(cmd, _)| cmd).to_lowercase();

        match cmd.as_str() {
            "start" => Some(Self::Start),
            "help" | "h" => Some(Self::Help),
            "authorize" | "auth" | "login" => Some(Self::Authorize {
                force: args.is_some_and(|a| a.eq_ignore_ascii_case("force")),
            }),
            "code" => args.map(|a| Self::Code(a.to_owned())),
            "download" | "dl" => args.map(|a| Self::Download(a.to_owned())),
            "liked" | "downloadliked" => Some(Self::Liked),
            "albums" | "downloadalbums" => Some(Self::Albums),
            "playlists" | "downloadplaylists" => Some(Self::Playlists),
            "sync" => Some(Self::Sync(args.map(str::to_owned))),
            "tracked" | "list" | "ls" => Some(Self::Tracked),
            "untrack" | "forget" => args.map(|a| Self::Untrack(a.to_owned())),
            "status" | "s" => Some(Self::Status),
            "version" | "about" => Some(Self::Version),
            _ => None,
        }
    }

    /// The query a download shortcut stands for.
    #[must_use]
    pub fn download_query(&self) -> Option<&str> {
        match self {
            Self::Download(query) => Some(query),
            Self::Liked => Some(SAVED_TRACKS_QUERY),
            Self::Albums => Some(SAVED_ALBUMS_QUERY),
            Self::Playlists => Some(USER_PLAYLISTS_QUERY),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Authorize { .. } => "authorize",
            Self::Code(_) => "code",
            Self::Download(_) => "download",
            Self::Liked => "liked",
            Self::Albums => "albums",
            Self::Playlists => "playlists",
            Self::Sync(_) => "sync",
            Self::Tracked => "tracked",
            Self::Untrack(_) => "untrack",
            Self::Status => "status",
            Self::Version => "version",
        }
    }

    /// Commands as shown in help: (usage, description).
    #[must_use]
    pub const fn all_commands() -> &'static [(&'static str, &'static str)] {
        &[
            ("download <url>", "Download a track, album, playlist or artist and keep it in sync"),
            ("liked", "Download your liked songs"),
            ("albums", "Download your saved albums"),
            ("playlists", "Download your playlists"),
            ("sync [query]", "Sync every tracked query, or just one"),
            ("tracked", "List tracked queries"),
            ("untrack <query>", "Stop tracking a query (files are kept)"),
            ("authorize [force]", "Connect your Spotify account"),
            ("code <url>", "Finish authorization with the redirect URL"),
            ("status", "Show what the bot is doing"),
            ("version", "Show the bot version"),
            ("help", "Show this help message"),
        ]
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorize { force: true } => write!(f, "authorize force"),
            Self::Download(query) => write!(f, "download {query}"),
            Self::Sync(Some(query)) => write!(f, "sync {query}"),
            Self::Untrack(query) => write!(f, "untrack {query}"),
            // Never echo authorization codes into logs.
            Self::Code(_) => write!(f, "code <redacted>"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub success: bool,

    /// Reply sent back to the chat.
    pub message: String,
}

impl CommandResult {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "/";
    const TRACK: &str = "https://open.spotify.com/track/2zQvtkghOHiBG48Bj0oFR9";

    #[test]
    fn test_parse_simple() {
        assert_eq!(BotCommand::parse("/start", PREFIX), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/status", PREFIX), Some(BotCommand::Status));
        assert_eq!(BotCommand::parse("/liked", PREFIX), Some(BotCommand::Liked));
        assert_eq!(
            BotCommand::parse("/downloadplaylists", PREFIX),
            Some(BotCommand::Playlists)
        );
    }

    #[test]
    fn test_parse_download() {
        assert_eq!(
            BotCommand::parse(&format!("/download {TRACK}"), PREFIX),
            Some(BotCommand::Download(TRACK.to_owned()))
        );
        assert_eq!(BotCommand::parse("/download", PREFIX), None);
        assert_eq!(BotCommand::parse("/download    ", PREFIX), None);
    }

    #[test]
    fn test_bare_url_is_download() {
        assert_eq!(
            BotCommand::parse(&format!("  {TRACK}  "), PREFIX),
            Some(BotCommand::Download(TRACK.to_owned()))
        );
        assert_eq!(BotCommand::parse("hello there", PREFIX), None);
    }

    #[test]
    fn test_parse_bot_mention() {
        assert_eq!(
            BotCommand::parse("/sync@music_sync_bot", PREFIX),
            Some(BotCommand::Sync(None))
        );
        assert_eq!(
            BotCommand::parse("/Sync@music_sync_bot saved", PREFIX),
            Some(BotCommand::Sync(Some("saved".to_owned())))
        );
    }

    #[test]
    fn test_parse_authorize() {
        assert_eq!(
            BotCommand::parse("/authorize", PREFIX),
            Some(BotCommand::Authorize { force: false })
        );
        assert_eq!(
            BotCommand::parse("/authorize FORCE", PREFIX),
            Some(BotCommand::Authorize { force: true })
        );
        assert_eq!(
            BotCommand::parse("/code http://localhost/cb?code=abc", PREFIX),
            Some(BotCommand::Code("http://localhost/cb?code=abc".to_owned()))
        );
        assert_eq!(BotCommand::parse("/code", PREFIX), None);
    }

    #[test]
    fn test_parse_untrack_requires_query() {
        assert_eq!(BotCommand::parse("/untrack", PREFIX), None);
        assert_eq!(
            BotCommand::parse("/untrack saved", PREFIX),
            Some(BotCommand::Untrack("saved".to_owned()))
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(BotCommand::parse("/donate", PREFIX), None);
    }

    #[test]
    fn test_download_query_shortcuts() {
        assert_eq!(BotCommand::Liked.download_query(), Some("saved"));
        assert_eq!(
            BotCommand::Playlists.download_query(),
            Some("all-user-playlists")
        );
        assert_eq!(BotCommand::Status.download_query(), None);
    }

    #[test]
    fn test_code_is_redacted_in_display() {
        let cmd = BotCommand::Code("secret-code".to_owned());
        assert_eq!(cmd.to_string(), "code <redacted>");
    }
}
