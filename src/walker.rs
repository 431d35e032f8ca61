//! A caller-driven, depth-first iterator over a remote directory tree.

use crate::client::FtpClient;
use crate::error::FtpError;
use crate::listing::{Entry, EntryKind};

#[derive(Debug)]
pub(crate) struct WalkItem {
    path: String,
    entry: Entry,
    err: Option<FtpError>,
}

/// Walks a remote tree depth-first. Created by
/// [`FtpClient::walk`](crate::FtpClient::walk).
///
/// ```no_run
/// # async fn run(client: libftpc::FtpClient) -> libftpc::FtpResult<()> {
/// let mut walker = client.walk("/pub");
/// while walker.next().await {
///     if let Some(err) = walker.err() {
///         eprintln!("{}: {}", walker.path(), err);
///         continue;
///     }
///     println!("{}", walker.path());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Walker<'a> {
    client: &'a FtpClient,
    cur: WalkItem,
    stack: Vec<WalkItem>,
    descend: bool,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(client: &'a FtpClient, root: &str) -> Self {
        let mut root = root.to_string();
        if !root.ends_with('/') {
            root.push('/');
        }
        let name = root
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
            .to_string();
        Walker {
            client,
            cur: WalkItem {
                path: String::new(),
                entry: Entry {
                    name: String::new(),
                    kind: EntryKind::File,
                    size: 0,
                    modified: None,
                    target: None,
                },
                err: None,
            },
            stack: vec![WalkItem {
                path: root,
                entry: Entry {
                    name,
                    kind: EntryKind::Folder,
                    size: 0,
                    modified: None,
                    target: None,
                },
                err: None,
            }],
            descend: true,
        }
    }

    /// Advances to the next entry. Returns `false` once the traversal is
    /// exhausted. Listing errors do not stop the walk; they surface
    /// through [`err`](Walker::err) on the item that carries them.
    pub async fn next(&mut self) -> bool {
        if self.descend
            && !self.cur.path.is_empty()
            && self.cur.err.is_none()
            && self.cur.entry.kind == EntryKind::Folder
        {
            match self.client.list(&self.cur.path).await {
                Ok(entries) => {
                    // Children are pushed in reverse so popping visits them
                    // in the order the server listed them.
                    for entry in entries.into_iter().rev() {
                        if entry.name == "." || entry.name == ".." {
                            continue;
                        }
                        let mut path = format!("{}{}", self.cur.path, entry.name);
                        if entry.kind == EntryKind::Folder {
                            path.push('/');
                        }
                        self.stack.push(WalkItem {
                            path,
                            entry,
                            err: None,
                        });
                    }
                }
                Err(err) => {
                    // Revisit the folder, now carrying the error.
                    self.stack.push(WalkItem {
                        path: self.cur.path.clone(),
                        entry: self.cur.entry.clone(),
                        err: Some(err),
                    });
                }
            }
        }

        match self.stack.pop() {
            Some(item) => {
                self.cur = item;
                self.descend = true;
                true
            }
            None => false,
        }
    }

    /// Suppresses descending into the current folder before the next call
    /// to [`next`](Walker::next).
    pub fn skip_subtree(&mut self) {
        self.descend = false;
    }

    /// The entry of the current item.
    pub fn stat(&self) -> &Entry {
        &self.cur.entry
    }

    /// The full remote path of the current item. Folder paths carry a
    /// trailing slash.
    pub fn path(&self) -> &str {
        &self.cur.path
    }

    /// The error attached to the current item, if expanding its listing
    /// failed.
    pub fn err(&self) -> Option<&FtpError> {
        self.cur.err.as_ref()
    }
}
