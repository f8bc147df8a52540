//! IndexedNamespace: flat dotted element names to a directory tree
//! (spec.md §3 "IndexedNamespace", §4.J).

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    /// `Some(i)` for a real element; `None` for a synthetic directory
    /// entry inserted to make an element's dotted prefix traversable.
    pub element_index: Option<usize>,
    /// Count of immediately following entries in `S` that are descendants
    /// of this one (spec.md §4.J point 3).
    pub skip: usize,
}

impl Entry {
    pub fn is_fake(&self) -> bool {
        self.element_index.is_none()
    }
}

pub struct IndexedNamespace {
    entries: Vec<Entry>,
    /// element index -> position in `entries`.
    by_element_index: Vec<Option<usize>>,
}

impl IndexedNamespace {
    /// Builds the sorted array from the router's element names. `names[i]`
    /// is element `i`'s dotted name.
    pub fn build(names: &[String]) -> IndexedNamespace {
        let mut all_names: BTreeSet<String> = BTreeSet::new();
        for name in names {
            all_names.insert(name.clone());
            let mut prefix = name.as_str();
            while let Some(pos) = prefix.rfind('.') {
                prefix = &prefix[..pos];
                all_names.insert(prefix.to_string());
            }
        }

        let mut name_to_elem = std::collections::HashMap::new();
        for (i, name) in names.iter().enumerate() {
            name_to_elem.insert(name.clone(), i);
        }

        let mut entries: Vec<Entry> = all_names
            .into_iter()
            .map(|name| {
                let element_index = name_to_elem.get(&name).copied();
                Entry { name, element_index, skip: 0 }
            })
            .collect();

        for i in 0..entries.len() {
            let prefix = format!("{}.", entries[i].name);
            let mut skip = 0;
            for entry in &entries[i + 1..] {
                if entry.name.starts_with(&prefix) {
                    skip += 1;
                } else {
                    break;
                }
            }
            entries[i].skip = skip;
        }

        let mut by_element_index = vec![None; names.len()];
        for (pos, entry) in entries.iter().enumerate() {
            if let Some(idx) = entry.element_index {
                by_element_index[idx] = Some(pos);
            }
        }

        IndexedNamespace { entries, by_element_index }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn position_of_element(&self, element_index: usize) -> Option<usize> {
        self.by_element_index.get(element_index).copied().flatten()
    }

    pub fn position_of_name(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// The immediate and transitive children of entry `i`: exactly
    /// `S[i+1 .. i+1+skip(i)]` (spec.md Testable Property 8).
    pub fn children_of(&self, i: usize) -> &[Entry] {
        let skip = self.entries[i].skip;
        &self.entries[i + 1..i + 1 + skip]
    }
}

/// Directory-kind tag encoded in the top bits of an inode number
/// (spec.md §4.J "Inode encoding").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Global,
    Enumerated,
    Named,
    HandlerDir,
    Element,
}

impl InodeKind {
    fn tag(self) -> u64 {
        match self {
            InodeKind::Global => 0,
            InodeKind::Enumerated => 1,
            InodeKind::Named => 2,
            InodeKind::HandlerDir => 3,
            InodeKind::Element => 4,
        }
    }

    fn from_tag(tag: u64) -> Option<InodeKind> {
        match tag {
            0 => Some(InodeKind::Global),
            1 => Some(InodeKind::Enumerated),
            2 => Some(InodeKind::Named),
            3 => Some(InodeKind::HandlerDir),
            4 => Some(InodeKind::Element),
            _ => None,
        }
    }
}

const INODE_TAG_SHIFT: u32 = 48;
const INODE_INDEX_MASK: u64 = (1u64 << INODE_TAG_SHIFT) - 1;

pub fn encode_inode(kind: InodeKind, index: u64) -> u64 {
    (kind.tag() << INODE_TAG_SHIFT) | (index & INODE_INDEX_MASK)
}

pub fn decode_inode(inode: u64) -> Option<(InodeKind, u64)> {
    let tag = inode >> INODE_TAG_SHIFT;
    let index = inode & INODE_INDEX_MASK;
    InodeKind::from_tag(tag).map(|k| (k, index))
}

/// `readdir` offset regions (spec.md §4.J table).
pub mod readdir_offsets {
    pub const DOTDOT: u64 = 0x000000;
    pub const DOT: u64 = 0x000001;
    pub const HANDLERS_BASE: u64 = 0x100000;
    pub const HANDLERS_END: u64 = 0x1FFFFF;
    pub const NUMERIC_SUBDIRS_BASE: u64 = 0x200000;
    pub const NUMERIC_SUBDIRS_END: u64 = 0x2FFFFF;
    pub const NAMED_CHILDREN_BASE: u64 = 0x300000;
    pub const NAMED_CHILDREN_END: u64 = 0x3FFFFF;
    pub const SPECIAL: u64 = 0x400000;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub offset: u64,
    pub name: String,
    pub inode: u64,
}

impl IndexedNamespace {
    fn named_children(&self, i: usize, offset: u64, out: &mut Vec<DirEntry>) {
        use readdir_offsets::*;
        let children = self.children_of(i);
        let start = if offset > NAMED_CHILDREN_BASE {
            (offset - NAMED_CHILDREN_BASE) as usize
        } else {
            0
        };
        for (k, child) in children.iter().enumerate().skip(start) {
            let off = NAMED_CHILDREN_BASE + k as u64;
            if off > NAMED_CHILDREN_END {
                break;
            }
            let inode = match child.element_index {
                Some(idx) => encode_inode(InodeKind::Element, idx as u64),
                None => encode_inode(InodeKind::Named, (i + 1 + k) as u64),
            };
            out.push(DirEntry { offset: off, name: child.name.clone(), inode });
        }
    }

    /// The entries with no dotted parent: the direct children of the
    /// filesystem root (spec.md §6 "`/` contains one directory per
    /// element... plus `.e`/`.h`").
    fn top_level_positions(&self) -> Vec<usize> {
        self.entries.iter().enumerate().filter(|(_, e)| !e.name.contains('.')).map(|(i, _)| i).collect()
    }

    /// Lists the children of the named entry at position `i`: `.`, `..`,
    /// that element's handler names (if it is a real element), and its
    /// named namespace children — the HANDLERS, DOT/DOTDOT, and
    /// NAMED_CHILDREN regions of the spec.md §4.J offset table.
    /// `handler_names` are the unqualified handler names registered on
    /// entry `i`'s element (empty for a synthetic directory entry).
    pub fn readdir(&self, i: usize, offset: u64, handler_names: &[String]) -> Vec<DirEntry> {
        use readdir_offsets::*;
        let mut out = Vec::new();
        if offset <= DOTDOT {
            out.push(DirEntry { offset: DOTDOT, name: "..".into(), inode: encode_inode(InodeKind::Named, i as u64) });
        }
        if offset <= DOT {
            out.push(DirEntry { offset: DOT, name: ".".into(), inode: encode_inode(InodeKind::Named, i as u64) });
        }
        if offset < NUMERIC_SUBDIRS_BASE {
            let start = if offset > HANDLERS_BASE { (offset - HANDLERS_BASE) as usize } else { 0 };
            for (k, name) in handler_names.iter().enumerate().skip(start) {
                let off = HANDLERS_BASE + k as u64;
                if off > HANDLERS_END {
                    break;
                }
                out.push(DirEntry { offset: off, name: name.clone(), inode: encode_inode(InodeKind::HandlerDir, k as u64) });
            }
        }
        self.named_children(i, offset, &mut out);
        out
    }

    /// Lists `.e`'s children: one numeric subdirectory per element, by
    /// index (the NUMERIC_SUBDIRS region).
    pub fn readdir_enumerated(&self, element_count: usize, offset: u64) -> Vec<DirEntry> {
        use readdir_offsets::*;
        let mut out = Vec::new();
        let start = if offset > NUMERIC_SUBDIRS_BASE { (offset - NUMERIC_SUBDIRS_BASE) as usize } else { 0 };
        for idx in start..element_count {
            let off = NUMERIC_SUBDIRS_BASE + idx as u64;
            if off > NUMERIC_SUBDIRS_END {
                break;
            }
            out.push(DirEntry { offset: off, name: idx.to_string(), inode: encode_inode(InodeKind::Element, idx as u64) });
        }
        out
    }

    /// Lists the filesystem root's children: the top-level named entries
    /// plus the `.e` and `.h` SPECIAL entries.
    pub fn readdir_root(&self, offset: u64) -> Vec<DirEntry> {
        use readdir_offsets::*;
        let mut out = Vec::new();
        if offset <= DOTDOT {
            out.push(DirEntry { offset: DOTDOT, name: "..".into(), inode: encode_inode(InodeKind::Global, 0) });
        }
        if offset <= DOT {
            out.push(DirEntry { offset: DOT, name: ".".into(), inode: encode_inode(InodeKind::Global, 0) });
        }
        let top = self.top_level_positions();
        let start = if offset > NAMED_CHILDREN_BASE {
            (offset - NAMED_CHILDREN_BASE) as usize
        } else {
            0
        };
        for (k, &pos) in top.iter().enumerate().skip(start) {
            let off = NAMED_CHILDREN_BASE + k as u64;
            if off > NAMED_CHILDREN_END {
                break;
            }
            let entry = &self.entries[pos];
            let inode = match entry.element_index {
                Some(idx) => encode_inode(InodeKind::Element, idx as u64),
                None => encode_inode(InodeKind::Named, pos as u64),
            };
            out.push(DirEntry { offset: off, name: entry.name.clone(), inode });
        }
        if offset <= SPECIAL {
            out.push(DirEntry { offset: SPECIAL, name: ".e".into(), inode: encode_inode(InodeKind::Enumerated, 0) });
            out.push(DirEntry { offset: SPECIAL + 1, name: ".h".into(), inode: encode_inode(InodeKind::HandlerDir, 0) });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_directories_are_inserted_for_dotted_prefixes() {
        let names = vec!["a.b.c".to_string(), "a.b.d".to_string(), "x".to_string()];
        let ns = IndexedNamespace::build(&names);
        let positions: Vec<&str> = ns.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(positions, vec!["a", "a.b", "a.b.c", "a.b.d", "x"]);
        assert!(ns.entries()[0].is_fake());
        assert!(ns.entries()[1].is_fake());
        assert!(!ns.entries()[2].is_fake());
    }

    #[test]
    fn skip_counts_cover_exactly_the_descendants() {
        let names = vec!["a.b.c".to_string(), "a.b.d".to_string(), "a.e".to_string(), "x".to_string()];
        let ns = IndexedNamespace::build(&names);
        for i in 0..ns.entries().len() {
            let entry = &ns.entries()[i];
            let children = ns.children_of(i);
            for child in children {
                assert!(child.name.starts_with(&format!("{}.", entry.name)));
            }
        }
        let a_pos = ns.position_of_name("a").unwrap();
        assert_eq!(ns.entries()[a_pos].skip, 4); // a.b, a.b.c, a.b.d, a.e
    }

    #[test]
    fn inode_round_trips_through_encode_decode() {
        let inode = encode_inode(InodeKind::Element, 42);
        assert_eq!(decode_inode(inode), Some((InodeKind::Element, 42)));
    }

    #[test]
    fn readdir_always_starts_with_dot_and_dotdot_from_zero_offset() {
        let names = vec!["solo".to_string()];
        let ns = IndexedNamespace::build(&names);
        let pos = ns.position_of_name("solo").unwrap();
        let entries = ns.readdir(pos, 0, &[]);
        assert_eq!(entries[0].name, "..");
        assert_eq!(entries[1].name, ".");
    }

    #[test]
    fn readdir_lists_handler_names_in_the_handlers_region() {
        let names = vec!["c".to_string()];
        let ns = IndexedNamespace::build(&names);
        let pos = ns.position_of_name("c").unwrap();
        let handlers = vec!["count".to_string(), "active".to_string()];
        let entries = ns.readdir(pos, 0, &handlers);
        let handler_entries: Vec<&str> = entries
            .iter()
            .filter(|e| e.offset >= readdir_offsets::HANDLERS_BASE && e.offset <= readdir_offsets::HANDLERS_END)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(handler_entries, vec!["count", "active"]);
    }

    #[test]
    fn readdir_named_children_follow_the_handlers_region() {
        let names = vec!["a".to_string(), "a.b".to_string()];
        let ns = IndexedNamespace::build(&names);
        let pos = ns.position_of_name("a").unwrap();
        let entries = ns.readdir(pos, 0, &["h1".to_string()]);
        let names_out: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names_out, vec!["..", ".", "h1", "a.b"]);
    }

    #[test]
    fn readdir_enumerated_lists_one_numeric_entry_per_element() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ns = IndexedNamespace::build(&names);
        let entries = ns.readdir_enumerated(names.len(), 0);
        let names_out: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names_out, vec!["0", "1", "2"]);
    }

    #[test]
    fn readdir_root_includes_special_e_and_h_entries() {
        let names = vec!["a".to_string(), "a.b".to_string(), "x".to_string()];
        let ns = IndexedNamespace::build(&names);
        let entries = ns.readdir_root(0);
        let names_out: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names_out, vec!["..", ".", "a", "x", ".e", ".h"]);
    }

    #[test]
    fn readdir_root_omits_nested_entries() {
        let names = vec!["a.b".to_string()];
        let ns = IndexedNamespace::build(&names);
        let entries = ns.readdir_root(0);
        assert!(!entries.iter().any(|e| e.name == "a.b"));
        assert!(entries.iter().any(|e| e.name == "a"));
    }
}
