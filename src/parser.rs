//! Parser pooling and tree ownership.
//!
//! Tree-sitter parsers are stateful and not thread-safe, and binding a
//! grammar to a fresh parser is not free. Each [`ParserPool`] owns a
//! bounded set of parsers for one [`Grammar`]; the [`ParserManager`] owns
//! one pool per grammar, created on first use.
//!
//! A pool never creates more than `max_size` parsers. When all of them are
//! on loan, [`ParserPool::acquire`] blocks until one comes back. Parsers
//! are lent for the duration of a single parse; the resulting
//! [`ParsedTree`] outlives the loan and is owned exclusively by the caller.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Tree};

use crate::errors::ParseError;
use crate::lang::{Grammar, Lang, detect_language, is_jsx_variant};
use crate::types::Location;

// ---------------------------------------------------------------------------
// Sizing policy
// ---------------------------------------------------------------------------

const MIN_POOL_SIZE: usize = 4;
const MAX_POOL_SIZE: usize = 32;

/// Pool size for a machine with `cpus` logical CPUs: doubled, clamped to
/// `[4, 32]`.
pub fn pool_size_for(cpus: usize) -> usize {
    cpus.saturating_mul(2).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
}

/// Default parser pool size for this machine.
///
/// Any worker pool that drives concurrent extraction must be sized with
/// this same function, otherwise workers serialize on `acquire`.
pub fn default_pool_size() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    pool_size_for(cpus)
}

// ---------------------------------------------------------------------------
// ParsedTree
// ---------------------------------------------------------------------------

/// A parse result owned by exactly one caller.
///
/// Deliberately not `Clone`. The native tree is released when this value
/// is closed or dropped, whichever comes first.
#[derive(Debug)]
pub struct ParsedTree {
    tree: Tree,
    grammar: Grammar,
    source_len: usize,
}

impl ParsedTree {
    fn new(tree: Tree, grammar: Grammar, source_len: usize) -> Self {
        Self {
            tree,
            grammar,
            source_len,
        }
    }

    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// True when the source contained syntax errors. The tree is still
    /// usable; error regions are simply missing or wrapped in ERROR nodes.
    pub fn has_error(&self) -> bool {
        self.tree.root_node().has_error()
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Length in bytes of the source buffer this tree was parsed from.
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn root_location(&self) -> Location {
        Location::of(self.root_node())
    }

    /// Release the tree.
    pub fn close(self) {
        drop(self);
    }
}

// ---------------------------------------------------------------------------
// ParserPool
// ---------------------------------------------------------------------------

/// A bounded, lazily-grown pool of parsers for one grammar.
pub struct ParserPool {
    grammar: Grammar,
    language: tree_sitter::Language,
    max_size: usize,
    idle_tx: Sender<Parser>,
    idle_rx: Receiver<Parser>,
    /// Number of parsers ever created; gates creation.
    created: Mutex<usize>,
    closed: AtomicBool,
}

impl ParserPool {
    /// Create an empty pool. No parser is created until the first acquire.
    pub fn new(grammar: Grammar, max_size: usize) -> Result<Self, ParseError> {
        let language = grammar.ts_language().ok_or(ParseError::UnknownLanguage)?;
        let max_size = max_size.max(1);
        let (idle_tx, idle_rx) = crossbeam_channel::bounded(max_size);
        Ok(Self {
            grammar,
            language,
            max_size,
            idle_tx,
            idle_rx,
            created: Mutex::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Borrow a parser.
    ///
    /// Pops an idle parser if there is one, otherwise creates a new one
    /// while under `max_size`, otherwise blocks until a parser is released.
    pub fn acquire(&self) -> Result<PooledParser<'_>, ParseError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ParseError::PoolClosed(self.grammar));
        }

        if let Ok(parser) = self.idle_rx.try_recv() {
            return Ok(self.lend(parser));
        }

        {
            let mut created = self.created.lock();
            if *created < self.max_size {
                let parser = self.create_parser()?;
                *created += 1;
                debug!(grammar = %self.grammar, created = *created, "created parser");
                return Ok(self.lend(parser));
            }
        }

        // At capacity: wait for a loan to come back.
        let parser = self
            .idle_rx
            .recv()
            .map_err(|_| ParseError::PoolClosed(self.grammar))?;
        Ok(self.lend(parser))
    }

    /// Return a parser to the idle queue.
    ///
    /// If the pool is closed or the queue is unexpectedly full the parser
    /// is destroyed instead.
    pub fn release(&self, mut parser: Parser) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        parser.reset();
        match self.idle_tx.try_send(parser) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(grammar = %self.grammar, "parser idle queue full, destroying parser");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Destroy every idle parser. The pool must not be acquired from
    /// afterward. Parsers still on loan are destroyed when they are
    /// released.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let mut destroyed = 0;
        while self.idle_rx.try_recv().is_ok() {
            destroyed += 1;
        }
        debug!(grammar = %self.grammar, destroyed, "closed parser pool");
        destroyed
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of parsers this pool has ever created.
    pub fn created(&self) -> usize {
        *self.created.lock()
    }

    /// Number of parsers currently idle in the queue.
    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }

    fn create_parser(&self) -> Result<Parser, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| ParseError::LanguageBinding {
                grammar: self.grammar,
                message: e.to_string(),
            })?;
        Ok(parser)
    }

    fn lend(&self, parser: Parser) -> PooledParser<'_> {
        PooledParser {
            pool: self,
            parser: Some(parser),
        }
    }
}

/// A parser on loan from a [`ParserPool`]; returned to the pool on drop.
pub struct PooledParser<'a> {
    pool: &'a ParserPool,
    parser: Option<Parser>,
}

impl Deref for PooledParser<'_> {
    type Target = Parser;

    fn deref(&self) -> &Parser {
        self.parser.as_ref().expect("parser is only taken on drop")
    }
}

impl DerefMut for PooledParser<'_> {
    fn deref_mut(&mut self) -> &mut Parser {
        self.parser.as_mut().expect("parser is only taken on drop")
    }
}

impl Drop for PooledParser<'_> {
    fn drop(&mut self) {
        if let Some(parser) = self.parser.take() {
            self.pool.release(parser);
        }
    }
}

// ---------------------------------------------------------------------------
// ParserManager
// ---------------------------------------------------------------------------

/// Aggregate parser usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ParserStats {
    pub parsers_created: usize,
    pub parses_called: usize,
}

/// Owns one [`ParserPool`] per grammar.
pub struct ParserManager {
    pools: RwLock<HashMap<Grammar, Arc<ParserPool>>>,
    pool_size: usize,
    parses_called: AtomicUsize,
    closed: AtomicBool,
}

impl ParserManager {
    /// Create a manager whose pools each hold at most `pool_size` parsers.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            pool_size: pool_size.max(1),
            parses_called: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a manager sized with [`default_pool_size`].
    pub fn with_default_pool_size() -> Self {
        Self::new(default_pool_size())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Parse `source` with the grammar for `lang` (and the JSX variant when
    /// `jsx` is set and the dialect has one).
    ///
    /// A tree with syntax errors is still returned successfully; only
    /// pool and binding failures are errors.
    pub fn parse(&self, source: &[u8], lang: Lang, jsx: bool) -> Result<ParsedTree, ParseError> {
        self.parses_called.fetch_add(1, Ordering::Relaxed);

        if lang == Lang::Unknown {
            return Err(ParseError::UnknownLanguage);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(ParseError::ManagerClosed);
        }

        let grammar = Grammar::new(lang, jsx);
        let pool = self
            .pool_for(grammar)
            .map_err(|e| ParseError::Pool(Box::new(e)))?;

        let tree = {
            let mut parser = pool
                .acquire()
                .map_err(|e| ParseError::Acquire(Box::new(e)))?;
            parser.parse(source, None)
        };

        let tree = tree.ok_or(ParseError::NoTree)?;
        Ok(ParsedTree::new(tree, grammar, source.len()))
    }

    /// Parse `source`, deriving dialect and JSX variant from `path`.
    pub fn parse_file(&self, source: &[u8], path: &Path) -> Result<ParsedTree, ParseError> {
        self.parse(source, detect_language(path), is_jsx_variant(path))
    }

    pub fn stats(&self) -> ParserStats {
        let parsers_created = self.pools.read().values().map(|p| p.created()).sum();
        ParserStats {
            parsers_created,
            parses_called: self.parses_called.load(Ordering::Relaxed),
        }
    }

    /// Number of pools currently owned.
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// Close every pool and clear the pool table. The manager rejects
    /// further parses.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut pools = self.pools.write();
        for (_, pool) in pools.drain() {
            pool.close();
        }
    }

    fn pool_for(&self, grammar: Grammar) -> Result<Arc<ParserPool>, ParseError> {
        if let Some(pool) = self.pools.read().get(&grammar) {
            return Ok(Arc::clone(pool));
        }

        let mut pools = self.pools.write();
        if let Some(pool) = pools.get(&grammar) {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(ParserPool::new(grammar, self.pool_size)?);
        debug!(grammar = %grammar, max_size = self.pool_size, "created parser pool");
        pools.insert(grammar, Arc::clone(&pool));
        Ok(pool)
    }
}

impl Default for ParserManager {
    fn default() -> Self {
        Self::with_default_pool_size()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn ts() -> Grammar {
        Grammar::new(Lang::TypeScript, false)
    }

    // ---------- sizing ----------

    #[test]
    fn pool_size_is_doubled_and_clamped() {
        assert_eq!(pool_size_for(1), 4);
        assert_eq!(pool_size_for(3), 6);
        assert_eq!(pool_size_for(16), 32);
        assert_eq!(pool_size_for(64), 32);
    }

    #[test]
    fn default_pool_size_is_in_range() {
        let n = default_pool_size();
        assert!((MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&n));
    }

    // ---------- ParserPool ----------

    #[test]
    fn pool_creates_lazily() {
        let pool = ParserPool::new(ts(), 3).unwrap();
        assert_eq!(pool.created(), 0);
        let p = pool.acquire().unwrap();
        assert_eq!(pool.created(), 1);
        drop(p);
        assert_eq!(pool.idle(), 1);
        let _p = pool.acquire().unwrap();
        assert_eq!(pool.created(), 1, "idle parser should be reused");
    }

    #[test]
    fn pool_for_unknown_language_fails() {
        assert!(matches!(
            ParserPool::new(Grammar::new(Lang::Unknown, false), 2),
            Err(ParseError::UnknownLanguage)
        ));
    }

    #[test]
    fn pool_blocks_at_capacity_until_release() {
        let pool = ParserPool::new(ts(), 2).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.created(), 2);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let pool_ref = &pool;
        thread::scope(|s| {
            s.spawn(move || {
                let c = pool_ref.acquire().unwrap();
                tx.send(()).unwrap();
                drop(c);
            });
            assert!(
                rx.recv_timeout(Duration::from_millis(150)).is_err(),
                "third acquire should block while both parsers are on loan"
            );
            drop(a);
            rx.recv_timeout(Duration::from_secs(10))
                .expect("blocked acquire should resume after a release");
        });
        drop(b);
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn closed_pool_rejects_acquire() {
        let pool = ParserPool::new(ts(), 2).unwrap();
        drop(pool.acquire().unwrap());
        assert_eq!(pool.close(), 1);
        assert_eq!(pool.idle(), 0);
        assert!(matches!(pool.acquire(), Err(ParseError::PoolClosed(_))));
    }

    #[test]
    fn release_after_close_destroys_parser() {
        let pool = ParserPool::new(ts(), 2).unwrap();
        let p = pool.acquire().unwrap();
        pool.close();
        drop(p);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn release_into_full_queue_does_not_panic() {
        let pool = ParserPool::new(ts(), 1).unwrap();
        drop(pool.acquire().unwrap());
        assert_eq!(pool.idle(), 1);
        // An extra parser the pool never lent out overflows the queue.
        let mut stray = Parser::new();
        stray.set_language(&ts().ts_language().unwrap()).unwrap();
        pool.release(stray);
        assert_eq!(pool.idle(), 1);
    }

    // ---------- ParserManager ----------

    #[test]
    fn parse_valid_source() {
        let mgr = ParserManager::new(4);
        let tree = mgr
            .parse(b"function greet(name: string): void {}", Lang::TypeScript, false)
            .unwrap();
        assert!(!tree.has_error());
        assert_eq!(tree.grammar(), ts());
        assert_eq!(tree.root_node().kind(), "program");
    }

    #[test]
    fn root_location_round_trip() {
        let mgr = ParserManager::new(4);
        let src = "const answer = 42;";
        let tree = mgr.parse(src.as_bytes(), Lang::TypeScript, false).unwrap();
        let loc = tree.root_location();
        assert_eq!(loc.start_line, 1);
        assert_eq!(loc.start_column, 1);
        assert_eq!(loc.start_byte, 0);
        assert_eq!(loc.end_byte, src.len());
        assert_eq!(tree.source_len(), src.len());
    }

    #[test]
    fn syntax_errors_return_a_tree() {
        let mgr = ParserManager::new(4);
        let tree = mgr.parse(b"const x: = ;", Lang::TypeScript, false).unwrap();
        assert!(tree.has_error());
        tree.close();
    }

    #[test]
    fn unknown_language_is_rejected_without_side_effects() {
        let mgr = ParserManager::new(4);
        let result = mgr.parse(b"fn main() {}", Lang::Unknown, false);
        assert!(matches!(result, Err(ParseError::UnknownLanguage)));
        assert_eq!(mgr.pool_count(), 0);
        assert_eq!(mgr.stats().parsers_created, 0);
    }

    #[test]
    fn parse_file_uses_extension() {
        let mgr = ParserManager::new(4);
        let tree = mgr
            .parse_file(b"const App = () => <div>hi</div>;", Path::new("App.tsx"))
            .unwrap();
        assert!(!tree.has_error());
        assert!(tree.grammar().jsx);

        let err = mgr.parse_file(b"x", Path::new("notes.txt")).unwrap_err();
        assert!(matches!(err, ParseError::UnknownLanguage));
    }

    #[test]
    fn one_pool_per_grammar() {
        let mgr = ParserManager::new(4);
        mgr.parse(b"let a = 1;", Lang::TypeScript, false).unwrap();
        mgr.parse(b"let b = 2;", Lang::TypeScript, false).unwrap();
        mgr.parse(b"let c = <a/>;", Lang::TypeScript, true).unwrap();
        mgr.parse(b"let d = 4;", Lang::JavaScript, true).unwrap();
        mgr.parse(b"let e = 5;", Lang::JavaScript, false).unwrap();
        assert_eq!(mgr.pool_count(), 3);
        assert_eq!(mgr.stats().parses_called, 5);
        assert_eq!(mgr.stats().parsers_created, 3);
    }

    #[test]
    fn parses_called_counts_failures_too() {
        let mgr = ParserManager::new(4);
        let _ = mgr.parse(b"", Lang::Unknown, false);
        mgr.parse(b"", Lang::JavaScript, false).unwrap();
        assert_eq!(mgr.stats().parses_called, 2);
    }

    #[test]
    fn close_empties_pool_table() {
        let mgr = ParserManager::new(4);
        mgr.parse(b"let a = 1;", Lang::TypeScript, false).unwrap();
        mgr.parse(b"let a = 1;", Lang::JavaScript, false).unwrap();
        assert_eq!(mgr.pool_count(), 2);
        mgr.close();
        assert_eq!(mgr.pool_count(), 0);
        assert!(matches!(
            mgr.parse(b"let a = 1;", Lang::TypeScript, false),
            Err(ParseError::ManagerClosed)
        ));
    }

    #[test]
    fn close_without_pools_does_not_panic() {
        let mgr = ParserManager::new(4);
        mgr.close();
        assert_eq!(mgr.pool_count(), 0);
    }

    #[test]
    fn concurrent_parses_stay_within_pool_bound() {
        let mgr = ParserManager::new(4);
        thread::scope(|s| {
            for i in 0..100 {
                let mgr = &mgr;
                s.spawn(move || {
                    let src = format!("export const value{i}: number = {i};");
                    let tree = mgr.parse(src.as_bytes(), Lang::TypeScript, false).unwrap();
                    assert!(!tree.has_error());
                });
            }
        });
        let stats = mgr.stats();
        assert_eq!(stats.parses_called, 100);
        assert!(stats.parsers_created <= 4, "created {}", stats.parsers_created);
        assert!(stats.parsers_created >= 1);
    }
}
