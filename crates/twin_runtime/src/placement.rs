//! Entity placement.
//!
//! A [`Placement`] answers which node owns an entity. The proxy only needs
//! the answer; how it is computed is up to the implementation.
//! [`HashPlacement`] is a rendezvous (highest random weight) hash over a fixed
//! node list: every node computes the same owner without coordination, and
//! removing a node only moves the entities it owned.

/// The node chosen for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    pub node_name: String,
}

pub trait Placement: Send + Sync {
    fn select(&self, entity_id: &str) -> Queue;
}

/// Rendezvous hashing over FNV-1a 64-bit scores.
#[derive(Debug, Clone)]
pub struct HashPlacement {
    local: String,
    nodes: Vec<String>,
}

impl HashPlacement {
    /// Place over `nodes`. An empty list places everything on `local`.
    pub fn new<I, S>(local: impl Into<String>, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();
        nodes.sort();
        nodes.dedup();
        Self {
            local: local.into(),
            nodes,
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }
}

impl Placement for HashPlacement {
    fn select(&self, entity_id: &str) -> Queue {
        let owner = self
            .nodes
            .iter()
            .max_by_key(|node| score(node, entity_id))
            .unwrap_or(&self.local);
        Queue {
            node_name: owner.clone(),
        }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// FNV-1a over `node`, a `0xff` separator (never valid UTF-8), then `entity`,
/// finished with the MurmurHash3 64-bit mixer so that ids sharing a long
/// prefix still spread.
fn score(node: &str, entity: &str) -> u64 {
    let hash = node
        .bytes()
        .chain(std::iter::once(0xff))
        .chain(entity.bytes())
        .fold(FNV_OFFSET_BASIS, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
        });
    fmix64(hash)
}

fn fmix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^ (h >> 33)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_node_list_is_local() {
        let p = HashPlacement::new("node-a", Vec::<String>::new());
        assert_eq!(p.select("device123").node_name, "node-a");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let a = HashPlacement::new("node-a", ["node-a", "node-b", "node-c"]);
        let b = HashPlacement::new("node-b", ["node-c", "node-b", "node-a"]);
        for i in 0..50 {
            let entity = format!("entity-{i}");
            assert_eq!(a.select(&entity), b.select(&entity));
        }
    }

    #[test]
    fn test_spreads_over_nodes() {
        let p = HashPlacement::new("node-a", ["node-a", "node-b", "node-c"]);
        let mut owners: Vec<String> = (0..200)
            .map(|i| p.select(&format!("entity-{i}")).node_name)
            .collect();
        owners.sort();
        owners.dedup();
        assert_eq!(owners, ["node-a", "node-b", "node-c"]);
    }

    #[test]
    fn test_removing_a_node_only_moves_its_entities() {
        let full = HashPlacement::new("node-a", ["node-a", "node-b", "node-c"]);
        let reduced = HashPlacement::new("node-a", ["node-a", "node-b"]);
        for i in 0..200 {
            let entity = format!("entity-{i}");
            let before = full.select(&entity).node_name;
            if before != "node-c" {
                assert_eq!(reduced.select(&entity).node_name, before);
            }
        }
    }
}
