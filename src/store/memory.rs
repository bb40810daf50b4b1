//! In-process store with Redis semantics.
//!
//! Every call takes one lock, so each primitive is atomic and the composites
//! are atomic too. Empty structures are removed, and touching a key as the
//! wrong type is an error, as on a real server.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tokio::sync::Mutex;

use super::{Store, TakenPayload};
use crate::error::{Error, Result};

#[derive(Debug)]
enum Entry {
    List(VecDeque<Vec<u8>>),
    SortedSet(SortedSet),
    Hash(HashMap<String, Vec<u8>>),
}

impl Entry {
    fn type_name(&self) -> &'static str {
        match self {
            Entry::List(_) => "list",
            Entry::SortedSet(_) => "zset",
            Entry::Hash(_) => "hash",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Entry::List(list) => list.is_empty(),
            Entry::SortedSet(set) => set.scores.is_empty(),
            Entry::Hash(hash) => hash.is_empty(),
        }
    }
}

/// Members ordered by (score, member); ties fall back to lexical order.
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    order: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn upsert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.order.remove(&(old, member.to_string()));
        }
        self.order.insert((score, member.to_string()));
    }

    fn pop_min(&mut self) -> Option<(String, i64)> {
        let (score, member) = self.order.pop_first()?;
        self.scores.remove(&member);
        Some((member, score))
    }
}

/// [`Store`] kept in memory. Cloning is not offered; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields in the hash at `table`, 0 when absent.
    pub async fn hash_len(&self, table: &str) -> Result<u64> {
        let entries = self.entries.lock().await;
        match entries.get(table) {
            None => Ok(0),
            Some(Entry::Hash(hash)) => Ok(hash.len() as u64),
            Some(other) => Err(wrong_type(table, "hash", other)),
        }
    }

    /// Whether any structure exists at `key`.
    pub async fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}

fn wrong_type(key: &str, wanted: &str, found: &Entry) -> Error {
    Error::Store(format!(
        "WRONGTYPE {key} holds a {}, not a {wanted}",
        found.type_name()
    ))
}

fn expect_type(entries: &HashMap<String, Entry>, key: &str, wanted: &str) -> Result<()> {
    match entries.get(key) {
        Some(found) if found.type_name() != wanted => Err(wrong_type(key, wanted, found)),
        _ => Ok(()),
    }
}

fn list_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> Result<&'a mut VecDeque<Vec<u8>>> {
    match entries
        .entry(key.to_string())
        .or_insert_with(|| Entry::List(VecDeque::new()))
    {
        Entry::List(list) => Ok(list),
        other => Err(wrong_type(key, "list", other)),
    }
}

fn zset_mut<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Result<&'a mut SortedSet> {
    match entries
        .entry(key.to_string())
        .or_insert_with(|| Entry::SortedSet(SortedSet::default()))
    {
        Entry::SortedSet(set) => Ok(set),
        other => Err(wrong_type(key, "zset", other)),
    }
}

fn hash_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> Result<&'a mut HashMap<String, Vec<u8>>> {
    match entries
        .entry(key.to_string())
        .or_insert_with(|| Entry::Hash(HashMap::new()))
    {
        Entry::Hash(hash) => Ok(hash),
        other => Err(wrong_type(key, "hash", other)),
    }
}

/// Drop `key` if the last call left it empty.
fn prune(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries.get(key).is_some_and(Entry::is_empty) {
        entries.remove(key);
    }
}

fn pop_list(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    front: bool,
) -> Result<Option<Vec<u8>>> {
    let value = match entries.get_mut(key) {
        None => return Ok(None),
        Some(Entry::List(list)) if front => list.pop_front(),
        Some(Entry::List(list)) => list.pop_back(),
        Some(other) => return Err(wrong_type(key, "list", other)),
    };
    prune(entries, key);
    Ok(value)
}

fn pop_min(entries: &mut HashMap<String, Entry>, key: &str, count: usize) -> Result<Vec<(String, i64)>> {
    let popped = match entries.get_mut(key) {
        None => return Ok(Vec::new()),
        Some(Entry::SortedSet(set)) => std::iter::from_fn(|| set.pop_min()).take(count).collect(),
        Some(other) => return Err(wrong_type(key, "zset", other)),
    };
    prune(entries, key);
    Ok(popped)
}

fn hash_get(entries: &HashMap<String, Entry>, table: &str, field: &str) -> Result<Option<Vec<u8>>> {
    match entries.get(table) {
        None => Ok(None),
        Some(Entry::Hash(hash)) => Ok(hash.get(field).cloned()),
        Some(other) => Err(wrong_type(table, "hash", other)),
    }
}

fn hash_delete(entries: &mut HashMap<String, Entry>, table: &str, field: &str) -> Result<()> {
    match entries.get_mut(table) {
        None => return Ok(()),
        Some(Entry::Hash(hash)) => {
            hash.remove(field);
        }
        Some(other) => return Err(wrong_type(table, "hash", other)),
    }
    prune(entries, table);
    Ok(())
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn list_len(&self, key: &str) -> Result<u64> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(0),
            Some(Entry::List(list)) => Ok(list.len() as u64),
            Some(other) => Err(wrong_type(key, "list", other)),
        }
    }

    async fn list_push_front(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        list_mut(&mut entries, key)?.push_front(value.to_vec());
        Ok(())
    }

    async fn list_pop_back(&self, key: &str) -> Result<Option<Vec<u8>>> {
        pop_list(&mut *self.entries.lock().await, key, false)
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>> {
        pop_list(&mut *self.entries.lock().await, key, true)
    }

    async fn zset_len(&self, key: &str) -> Result<u64> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(0),
            Some(Entry::SortedSet(set)) => Ok(set.scores.len() as u64),
            Some(other) => Err(wrong_type(key, "zset", other)),
        }
    }

    async fn zset_upsert(&self, key: &str, member: &str, score: i64) -> Result<()> {
        let mut entries = self.entries.lock().await;
        zset_mut(&mut entries, key)?.upsert(member, score);
        Ok(())
    }

    async fn zset_pop_min(&self, key: &str, count: usize) -> Result<Vec<(String, i64)>> {
        pop_min(&mut *self.entries.lock().await, key, count)
    }

    async fn hash_set(&self, table: &str, field: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        hash_mut(&mut entries, table)?.insert(field.to_string(), value.to_vec());
        Ok(())
    }

    async fn hash_get(&self, table: &str, field: &str) -> Result<Option<Vec<u8>>> {
        hash_get(&*self.entries.lock().await, table, field)
    }

    async fn hash_delete(&self, table: &str, field: &str) -> Result<()> {
        hash_delete(&mut *self.entries.lock().await, table, field)
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn index_payload(
        &self,
        key: &str,
        table: &str,
        member: &str,
        score: i64,
        value: &[u8],
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        // Type-check both keys before writing either.
        expect_type(&entries, key, "zset")?;
        expect_type(&entries, table, "hash")?;
        hash_mut(&mut entries, table)?.insert(member.to_string(), value.to_vec());
        zset_mut(&mut entries, key)?.upsert(member, score);
        Ok(())
    }

    async fn take_min_payload(&self, key: &str, table: &str) -> Result<Option<TakenPayload>> {
        let mut entries = self.entries.lock().await;
        let Some((member, score)) = pop_min(&mut entries, key, 1)?.into_iter().next() else {
            return Ok(None);
        };
        let payload = hash_get(&entries, table, &member)?;
        hash_delete(&mut entries, table, &member)?;
        Ok(Some(TakenPayload {
            member,
            score,
            payload,
        }))
    }
}
