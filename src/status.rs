//! The FTP reply codes of RFC 959 and friends.
//
// The three digits form a code. Codes between 100 and 199 indicate marks;
// codes between 200 and 399 indicate acceptance; codes between 400 and 599
// indicate rejection. Clients should not read too much into anything past
// the first digit: the IETF adds new codes at its whim, and so do server
// authors. The constants here are the codes a client actually encounters in
// the wild, including a few (228, 430, 434) that RFC 959 technically never
// allowed.

use std::borrow::Cow;

/// 100 series: the requested action is being initiated.
pub const INITIATING: u16 = 100;
/// Restart marker reply.
pub const RESTART_MARKER: u16 = 110;
/// Service ready in N minutes.
pub const READY_MINUTE: u16 = 120;
/// Data connection already open; transfer starting.
pub const ALREADY_OPEN: u16 = 125;
/// File status okay; about to open data connection.
pub const ABOUT_TO_SEND: u16 = 150;

/// Command okay.
pub const COMMAND_OK: u16 = 200;
/// Command not implemented, superfluous at this site.
pub const COMMAND_NOT_IMPLEMENTED: u16 = 202;
/// System status, or system help reply. Carries the FEAT listing.
pub const SYSTEM: u16 = 211;
/// Directory status.
pub const DIRECTORY: u16 = 212;
/// File status. Carries SIZE and MDTM replies.
pub const FILE: u16 = 213;
/// Help message.
pub const HELP: u16 = 214;
/// NAME system type.
pub const NAME: u16 = 215;
/// Service ready for new user.
pub const READY: u16 = 220;
/// Service closing control connection.
pub const CLOSING: u16 = 221;
/// Data connection open; no transfer in progress.
pub const DATA_CONNECTION_OPEN: u16 = 225;
/// Closing data connection; requested file action successful.
pub const CLOSING_DATA_CONNECTION: u16 = 226;
/// Entering passive mode.
pub const PASSIVE_MODE: u16 = 227;
/// Entering long passive mode.
pub const LONG_PASSIVE_MODE: u16 = 228;
/// Entering extended passive mode.
pub const EXTENDED_PASSIVE_MODE: u16 = 229;
/// User logged in, proceed.
pub const LOGGED_IN: u16 = 230;
/// User logged out; service terminated.
pub const LOGGED_OUT: u16 = 231;
/// Logout command noted, will complete when transfer done.
pub const LOGOUT_ACK: u16 = 232;
/// AUTH security data exchange complete.
pub const AUTH_OK: u16 = 234;
/// Requested file action okay, completed.
pub const REQUESTED_FILE_ACTION_OK: u16 = 250;
/// "PATHNAME" created. Carries PWD and MKD replies.
pub const PATH_CREATED: u16 = 257;

/// User name okay, need password.
pub const USER_OK: u16 = 331;
/// Need account for login.
pub const LOGIN_NEED_ACCOUNT: u16 = 332;
/// Requested file action pending further information.
pub const REQUEST_FILE_PENDING: u16 = 350;

/// Service not available, closing control connection.
pub const NOT_AVAILABLE: u16 = 421;
/// Can't open data connection.
pub const CANNOT_OPEN_DATA_CONNECTION: u16 = 425;
/// Connection closed; transfer aborted.
pub const TRANSFER_ABORTED: u16 = 426;
/// Invalid username or password.
pub const INVALID_CREDENTIALS: u16 = 430;
/// Requested host unavailable.
pub const HOST_UNAVAILABLE: u16 = 434;
/// Requested file action not taken; file unavailable.
pub const FILE_ACTION_IGNORED: u16 = 450;
/// Requested action aborted: local error in processing.
pub const ACTION_ABORTED: u16 = 451;
/// Insufficient storage space in system.
pub const INSUFFICIENT_STORAGE: u16 = 452;

/// Syntax error, command unrecognized.
pub const BAD_COMMAND: u16 = 500;
/// Syntax error in parameters or arguments.
pub const BAD_ARGUMENTS: u16 = 501;
/// Command not implemented.
pub const NOT_IMPLEMENTED: u16 = 502;
/// Bad sequence of commands.
pub const BAD_SEQUENCE: u16 = 503;
/// Command not implemented for that parameter.
pub const NOT_IMPLEMENTED_PARAMETER: u16 = 504;
/// Not logged in.
pub const NOT_LOGGED_IN: u16 = 530;
/// Need account for storing files.
pub const STOR_NEED_ACCOUNT: u16 = 532;
/// Requested action not taken; file unavailable.
pub const FILE_UNAVAILABLE: u16 = 550;
/// Requested action aborted: page type unknown.
pub const PAGE_TYPE_UNKNOWN: u16 = 551;
/// Requested file action aborted; exceeded storage allocation.
pub const EXCEEDED_STORAGE: u16 = 552;
/// Requested action not taken; file name not allowed.
pub const BAD_FILE_NAME: u16 = 553;

/// Returns the human label of a reply code, or `"Unknown status code: N"`
/// for codes this library does not know about.
pub fn status_text(code: u16) -> Cow<'static, str> {
    let text = match code {
        INITIATING => "The requested action is being initiated",
        RESTART_MARKER => "Restart marker reply",
        READY_MINUTE => "Service ready in a few minutes",
        ALREADY_OPEN => "Data connection already open; transfer starting",
        ABOUT_TO_SEND => "File status okay; about to open data connection",
        COMMAND_OK => "Command okay",
        COMMAND_NOT_IMPLEMENTED => "Command not implemented, superfluous at this site",
        SYSTEM => "System status, or system help reply",
        DIRECTORY => "Directory status",
        FILE => "File status",
        HELP => "Help message",
        NAME => "NAME system type",
        READY => "Service ready for new user",
        CLOSING => "Service closing control connection",
        DATA_CONNECTION_OPEN => "Data connection open; no transfer in progress",
        CLOSING_DATA_CONNECTION => "Closing data connection; requested file action successful",
        PASSIVE_MODE => "Entering passive mode",
        LONG_PASSIVE_MODE => "Entering long passive mode",
        EXTENDED_PASSIVE_MODE => "Entering extended passive mode",
        LOGGED_IN => "User logged in, proceed",
        LOGGED_OUT => "User logged out; service terminated",
        LOGOUT_ACK => "Logout command noted, will complete when transfer done",
        AUTH_OK => "Security data exchange complete",
        REQUESTED_FILE_ACTION_OK => "Requested file action okay, completed",
        PATH_CREATED => "Path created",
        USER_OK => "User name okay, need password",
        LOGIN_NEED_ACCOUNT => "Need account for login",
        REQUEST_FILE_PENDING => "Requested file action pending further information",
        NOT_AVAILABLE => "Service not available, closing control connection",
        CANNOT_OPEN_DATA_CONNECTION => "Can't open data connection",
        TRANSFER_ABORTED => "Connection closed; transfer aborted",
        INVALID_CREDENTIALS => "Invalid username or password",
        HOST_UNAVAILABLE => "Requested host unavailable",
        FILE_ACTION_IGNORED => "Requested file action not taken; file unavailable",
        ACTION_ABORTED => "Requested action aborted: local error in processing",
        INSUFFICIENT_STORAGE => "Insufficient storage space in system",
        BAD_COMMAND => "Syntax error, command unrecognized",
        BAD_ARGUMENTS => "Syntax error in parameters or arguments",
        NOT_IMPLEMENTED => "Command not implemented",
        BAD_SEQUENCE => "Bad sequence of commands",
        NOT_IMPLEMENTED_PARAMETER => "Command not implemented for that parameter",
        NOT_LOGGED_IN => "Not logged in",
        STOR_NEED_ACCOUNT => "Need account for storing files",
        FILE_UNAVAILABLE => "Requested action not taken; file unavailable",
        PAGE_TYPE_UNKNOWN => "Requested action aborted: page type unknown",
        EXCEEDED_STORAGE => "Requested file action aborted; exceeded storage allocation",
        BAD_FILE_NAME => "Requested action not taken; file name not allowed",
        _ => return Cow::Owned(format!("Unknown status code: {}", code)),
    };
    Cow::Borrowed(text)
}
