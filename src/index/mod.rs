mod btree;
mod btree_page;
mod comparator;
mod index_iterator;
mod key;

pub use btree::BPlusTree;
pub use btree_page::{NodeMut, NodeRef};
pub use comparator::{KeyComparator, OrdComparator, ReverseComparator};
pub use index_iterator::IndexIterator;
pub use key::PageCodec;
