//! Dense configuration tree
//!
//! The dense tree is a nested map from directive name to value, with the
//! content of every `include` merged in place. Each leaf carries an index
//! into a [`ProvenanceIndex`] that records which file and line produced it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directive name to value
pub type DenseTree = BTreeMap<String, DenseValue>;

/// A directive's value in the dense tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DenseValue {
    /// Single occurrence
    Leaf(Leaf),
    /// Repeated or always-packed occurrences, in encounter order
    Many(Vec<Leaf>),
    /// Keyed by name (`log_format`) or by block arguments (`location /`)
    Keyed(BTreeMap<String, Leaf>),
}

impl DenseValue {
    /// All leaves in encounter order. Keyed leaves are ordered by their
    /// provenance index, not by key.
    pub fn leaves(&self) -> Vec<&Leaf> {
        match self {
            Self::Leaf(leaf) => vec![leaf],
            Self::Many(leaves) => leaves.iter().collect(),
            Self::Keyed(map) => {
                let mut leaves: Vec<&Leaf> = map.values().collect();
                leaves.sort_by_key(|l| l.index);
                leaves
            }
        }
    }

    /// Blocks and their keys (`None` for unkeyed blocks), in encounter order
    pub fn blocks(&self) -> Vec<(Option<&str>, &DenseTree, usize)> {
        match self {
            Self::Leaf(leaf) => leaf.block().map(|b| (None, b, leaf.index)).into_iter().collect(),
            Self::Many(leaves) => leaves
                .iter()
                .filter_map(|l| l.block().map(|b| (None, b, l.index)))
                .collect(),
            Self::Keyed(map) => {
                let mut blocks: Vec<_> = map
                    .iter()
                    .filter_map(|(k, l)| l.block().map(|b| (Some(k.as_str()), b, l.index)))
                    .collect();
                blocks.sort_by_key(|(_, _, index)| *index);
                blocks
            }
        }
    }

    /// Text values with their provenance index
    pub fn texts(&self) -> Vec<(&str, usize)> {
        self.leaves()
            .into_iter()
            .filter_map(|l| l.text().map(|t| (t, l.index)))
            .collect()
    }

    pub fn simplify(&self) -> Value {
        match self {
            Self::Leaf(leaf) => leaf.value.simplify(),
            Self::Many(leaves) => Value::Array(leaves.iter().map(|l| l.value.simplify()).collect()),
            Self::Keyed(map) => Value::Object(
                map.iter()
                    .map(|(k, l)| (k.clone(), l.value.simplify()))
                    .collect(),
            ),
        }
    }
}

/// A value and its provenance index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub value: LeafValue,
    pub index: usize,
}

impl Leaf {
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            LeafValue::Text(text) => Some(text),
            LeafValue::Block(_) => None,
        }
    }

    pub fn block(&self) -> Option<&DenseTree> {
        match &self.value {
            LeafValue::Block(tree) => Some(tree),
            LeafValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LeafValue {
    Text(String),
    Block(DenseTree),
}

impl LeafValue {
    fn simplify(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Block(tree) => simplify(tree),
        }
    }
}

/// The tree without provenance indices
pub fn simplify(tree: &DenseTree) -> Value {
    let map: Map<String, Value> = tree
        .iter()
        .map(|(k, v)| (k.clone(), v.simplify()))
        .collect();
    Value::Object(map)
}

/// Append-only `(file, line)` table the dense tree's leaves point into
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceIndex {
    files: Vec<PathBuf>,
    entries: Vec<(usize, usize)>,
}

impl ProvenanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a location and return its index
    pub fn add(&mut self, file: &Path, line: usize) -> usize {
        let file_index = match self.files.iter().position(|f| f == file) {
            Some(i) => i,
            None => {
                self.files.push(file.to_path_buf());
                self.files.len() - 1
            }
        };
        self.entries.push((file_index, line));
        self.entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<(&Path, usize)> {
        let (file_index, line) = *self.entries.get(index)?;
        Some((self.files.get(file_index)?.as_path(), line))
    }

    /// The file that produced the leaf at `index`
    pub fn file_of(&self, index: usize) -> Option<&Path> {
        self.get(index).map(|(file, _)| file)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(value: &str, index: usize) -> Leaf {
        Leaf {
            value: LeafValue::Text(value.to_string()),
            index,
        }
    }

    #[test]
    fn test_provenance_index() {
        let mut index = ProvenanceIndex::new();
        let a = index.add(Path::new("/etc/nginx/nginx.conf"), 1);
        let b = index.add(Path::new("/etc/nginx/mime.types"), 3);
        let c = index.add(Path::new("/etc/nginx/nginx.conf"), 7);

        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(index.files().len(), 2);
        assert_eq!(index.get(c), Some((Path::new("/etc/nginx/nginx.conf"), 7)));
        assert_eq!(index.file_of(b), Some(Path::new("/etc/nginx/mime.types")));
        assert_eq!(index.get(3), None);
    }

    #[test]
    fn test_simplify_strips_indices() {
        let mut server = DenseTree::new();
        server.insert("listen".to_string(), DenseValue::Leaf(text("80", 2)));
        let mut locations = BTreeMap::new();
        locations.insert(
            "/status".to_string(),
            Leaf {
                value: LeafValue::Block(DenseTree::new()),
                index: 3,
            },
        );
        server.insert("location".to_string(), DenseValue::Keyed(locations));

        let mut tree = DenseTree::new();
        tree.insert("user".to_string(), DenseValue::Leaf(text("nginx", 0)));
        tree.insert(
            "server".to_string(),
            DenseValue::Many(vec![Leaf {
                value: LeafValue::Block(server),
                index: 1,
            }]),
        );

        assert_eq!(
            simplify(&tree),
            json!({
                "user": "nginx",
                "server": [{"listen": "80", "location": {"/status": {}}}],
            })
        );
    }

    #[test]
    fn test_blocks_and_texts() {
        let value = DenseValue::Many(vec![
            text("a", 0),
            Leaf {
                value: LeafValue::Block(DenseTree::new()),
                index: 1,
            },
        ]);
        assert_eq!(value.texts(), vec![("a", 0)]);
        assert_eq!(value.blocks().len(), 1);
        assert_eq!(value.blocks()[0].2, 1);
    }

    #[test]
    fn test_keyed_blocks_follow_encounter_order() {
        let block = |index| Leaf {
            value: LeafValue::Block(DenseTree::new()),
            index,
        };
        let mut locations = BTreeMap::new();
        locations.insert("/zeta".to_string(), block(4));
        locations.insert("/alpha".to_string(), block(9));
        let value = DenseValue::Keyed(locations);

        let keys: Vec<_> = value.blocks().into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(keys, vec![Some("/zeta"), Some("/alpha")]);
        let indices: Vec<_> = value.leaves().into_iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![4, 9]);
    }
}
