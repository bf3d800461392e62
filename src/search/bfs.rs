//! Breadth-first search (spec section 4.5.1, 4.5.2).
//!
//! Grounded in the original's `search/bfs/parallel.go` and
//! `search/bfs/serial.go`. The concurrent variant keeps the original's
//! single-writer `visited` map (owned only by the driver thread, never
//! touched by loader workers — spec section 5's "do not shard the map"
//! warning) and its redirect-splice rule (a redirect hop never counts as a
//! path step). `std::sync::mpsc` plays the role of the original's
//! unbuffered/buffered Go channels; cancellation is polled on a short
//! `recv_timeout` since the std channels have no `select!`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::SearchResult;
use crate::model::TitlePath;
use crate::repo::PageRepository;

use super::{Outcome, PathFinder};

/// Default channel capacity for the titles-to-load frontier (spec section
/// 4.5.1's `frontierSize`). Real Wikipedia-scale dumps want the full
/// ten million; tests construct smaller finders directly.
pub const DEFAULT_FRONTIER_SIZE: usize = 10_000_000;
/// Default loader worker pool size (spec section 4.5.1's `numScraperThreads`).
pub const DEFAULT_NUM_WORKERS: usize = 10;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

enum WorkerMsg {
    Loaded(crate::model::Page),
    LoadFailed,
}

pub struct ConcurrentBfs {
    repo: Arc<dyn PageRepository>,
    frontier_size: usize,
    num_workers: usize,
}

impl ConcurrentBfs {
    pub fn new(repo: Arc<dyn PageRepository>) -> Self {
        ConcurrentBfs {
            repo,
            frontier_size: DEFAULT_FRONTIER_SIZE,
            num_workers: DEFAULT_NUM_WORKERS,
        }
    }

    pub fn with_tuning(repo: Arc<dyn PageRepository>, frontier_size: usize, num_workers: usize) -> Self {
        ConcurrentBfs {
            repo,
            frontier_size,
            num_workers: num_workers.max(1),
        }
    }
}

impl PathFinder for ConcurrentBfs {
    fn find_path(&self, start: &str, end: &str, cancel: CancellationToken) -> SearchResult<Outcome> {
        let (titles_tx, titles_rx) = sync_channel::<String>(self.frontier_size);
        let titles_rx = Arc::new(Mutex::new(titles_rx));
        let (pages_tx, pages_rx) = std::sync::mpsc::channel::<WorkerMsg>();

        let mut visited: HashMap<String, String> = HashMap::new();
        visited.insert(start.to_string(), String::new());
        // Seed; `outstanding` tracks titles sent but not yet resolved by a
        // worker, used to detect a fully-exhausted frontier (spec leaves
        // this case unspecified for the source; see DESIGN.md).
        let mut outstanding: i64 = 1;
        titles_tx.send(start.to_string()).expect("fresh channel");

        std::thread::scope(move |scope| {
            for _ in 0..self.num_workers {
                let titles_rx = titles_rx.clone();
                let pages_tx = pages_tx.clone();
                let repo = self.repo.clone();
                let cancel = cancel.clone();
                scope.spawn(move || loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let title = {
                        let rx = titles_rx.lock().expect("titles channel mutex poisoned");
                        rx.recv_timeout(CANCEL_POLL_INTERVAL)
                    };
                    match title {
                        Ok(title) => {
                            let msg = match repo.load_page(&title) {
                                Ok(page) => WorkerMsg::Loaded(page),
                                Err(_) => WorkerMsg::LoadFailed,
                            };
                            if pages_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                });
            }
            drop(pages_tx);

            let result = drive(&pages_rx, &titles_tx, &mut visited, start, end, &mut outstanding, &cancel);
            // Close the frontier so idle workers (polling on a
            // `recv_timeout` loop) observe disconnection and exit before
            // `thread::scope` joins them, rather than spinning until
            // `cancel` happens to be set by someone else.
            drop(titles_tx);
            result
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn drive(
    pages_rx: &Receiver<WorkerMsg>,
    titles_tx: &std::sync::mpsc::SyncSender<String>,
    visited: &mut HashMap<String, String>,
    start: &str,
    end: &str,
    outstanding: &mut i64,
    cancel: &CancellationToken,
) -> SearchResult<Outcome> {
    loop {
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        match pages_rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(WorkerMsg::LoadFailed) => {
                *outstanding -= 1;
                if *outstanding <= 0 {
                    return Ok(Outcome::NotFound);
                }
            }
            Ok(WorkerMsg::Loaded(page)) => {
                // Redirect splice: a hop through a redirect must not appear
                // as a path step (spec section 4.5.1, P9).
                if let Some(redirector) = &page.redirector {
                    if redirector != &page.title && !visited.contains_key(&page.title) {
                        if let Some(parent_of_redirector) = visited.get(redirector).cloned() {
                            visited.insert(page.title.clone(), parent_of_redirector);
                        }
                    }
                }

                for link in page.links_iter() {
                    if link == end {
                        visited.insert(link.to_string(), page.title.clone());
                        return Ok(Outcome::Found(reconstruct(visited, start, end)));
                    }
                    if !visited.contains_key(link) {
                        visited.insert(link.to_string(), page.title.clone());
                        *outstanding += 1;
                        if titles_tx.send(link.to_string()).is_err() {
                            // Workers gone (shouldn't happen before we're done).
                        }
                    }
                }

                *outstanding -= 1;
                if *outstanding <= 0 {
                    return Ok(Outcome::NotFound);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(Outcome::NotFound),
        }
    }
}

/// Walks `visited`'s parent pointers backward from `end` to `start` and
/// reverses, per spec section 4.5.1's reconstruction rule.
fn reconstruct(visited: &HashMap<String, String>, start: &str, end: &str) -> TitlePath {
    let mut titles = vec![end.to_string()];
    let mut current = end.to_string();
    while current != start {
        let parent = visited
            .get(&current)
            .cloned()
            .expect("every non-start node on the parent chain has an entry");
        titles.push(parent.clone());
        current = parent;
    }
    titles.reverse();

    let mut path = TitlePath::new(titles[0].clone());
    for t in titles.into_iter().skip(1) {
        path = path.catted(t);
    }
    path
}

/// Reference/test implementation: a plain queue of `TitlePath`s with no
/// concurrency and no redirect splicing — each link string is compared and
/// enqueued exactly as it appears in the page (spec section 4.5.2).
pub struct SerialBfs {
    repo: Arc<dyn PageRepository>,
}

impl SerialBfs {
    pub fn new(repo: Arc<dyn PageRepository>) -> Self {
        SerialBfs { repo }
    }
}

impl PathFinder for SerialBfs {
    fn find_path(&self, start: &str, end: &str, cancel: CancellationToken) -> SearchResult<Outcome> {
        let mut queue: VecDeque<TitlePath> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back(TitlePath::new(start));
        visited.insert(start.to_string());

        while let Some(path) = queue.pop_front() {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let page = match self.repo.load_page(path.head()) {
                Ok(page) => page,
                Err(_) => continue,
            };

            for link in page.links_iter() {
                if link == end {
                    return Ok(Outcome::Found(path.catted(link)));
                }
                if visited.insert(link.to_string()) {
                    queue.push_back(path.catted(link));
                }
            }
        }

        Ok(Outcome::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Page;
    use crate::repo::sled_repo::SledRepository;

    fn build_graph(repo: &SledRepository, edges: &[(&str, &[&str])]) {
        for (title, links) in edges {
            repo.save_page(&Page::with_links(*title, links.iter().map(|s| s.to_string()).collect()))
                .unwrap();
        }
    }

    #[test]
    fn concurrent_bfs_finds_shortest_path() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SledRepository::open(dir.path()).unwrap());
        // S -> A, S -> B, A -> T, B -> C, C -> T; shortest is S,A,T.
        build_graph(&repo, &[
            ("S", &["A", "B"]),
            ("A", &["T"]),
            ("B", &["C"]),
            ("C", &["T"]),
            ("T", &[]),
        ]);

        let finder = ConcurrentBfs::with_tuning(repo, 1024, 4);
        let outcome = finder.find_path("S", "T", CancellationToken::new()).unwrap();
        match outcome {
            Outcome::Found(path) => assert_eq!(path.titles(), &["S".to_string(), "A".to_string(), "T".to_string()]),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_bfs_is_redirect_transparent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SledRepository::open(dir.path()).unwrap());
        repo.save_page(&Page::with_links("S", vec!["X".to_string()])).unwrap();
        repo.save_page(&Page::redirect_to("X", "Y")).unwrap();
        repo.save_page(&Page::with_links("Y", vec!["T".to_string()])).unwrap();
        repo.save_page(&Page::with_links("T", vec![])).unwrap();

        let finder = ConcurrentBfs::with_tuning(repo, 1024, 4);
        let outcome = finder.find_path("S", "T", CancellationToken::new()).unwrap();
        match outcome {
            Outcome::Found(path) => assert_eq!(path.titles(), &["S".to_string(), "Y".to_string(), "T".to_string()]),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_bfs_returns_not_found_when_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SledRepository::open(dir.path()).unwrap());
        build_graph(&repo, &[("S", &["A"]), ("A", &[])]);
        repo.save_page(&Page::with_links("T", vec![])).unwrap();

        let finder = ConcurrentBfs::with_tuning(repo, 1024, 4);
        let outcome = finder.find_path("S", "T", CancellationToken::new()).unwrap();
        assert_eq!(outcome, Outcome::NotFound);
    }

    #[test]
    fn concurrent_bfs_honors_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SledRepository::open(dir.path()).unwrap());
        build_graph(&repo, &[("S", &["A"]), ("A", &["S"])]);

        let finder = ConcurrentBfs::with_tuning(repo, 1024, 2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = finder.find_path("S", "NeverThere", cancel).unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
    }

    #[test]
    fn serial_bfs_finds_shortest_path() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SledRepository::open(dir.path()).unwrap());
        build_graph(&repo, &[
            ("S", &["A", "B"]),
            ("A", &["T"]),
            ("B", &["C"]),
            ("C", &["T"]),
            ("T", &[]),
        ]);

        let finder = SerialBfs::new(repo);
        let outcome = finder.find_path("S", "T", CancellationToken::new()).unwrap();
        match outcome {
            Outcome::Found(path) => assert_eq!(path.titles(), &["S".to_string(), "A".to_string(), "T".to_string()]),
            other => panic!("expected Found, got {other:?}"),
        }
    }
}
