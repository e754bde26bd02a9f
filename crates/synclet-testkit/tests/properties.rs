//! Property tests over generated messages and write sets.

use std::time::Duration;

use proptest::prelude::*;

use synclet::core::{decode_message, encode_message, Timestamp};
use synclet_testkit::generators::{leaf_writes, message};
use synclet_testkit::{LeafWrite, MemorySynclet, ReplicaPool};

proptest! {
    #[test]
    fn codec_round_trip(m in message(3)) {
        let wire = encode_message(&m).unwrap();
        prop_assert_eq!(decode_message(&wire).unwrap(), m);
    }
}

async fn apply(replica: &MemorySynclet, prefix: &str, writes: &[LeafWrite]) {
    for write in writes {
        // Prefix per replica so no two replicas mint the same timestamp.
        let timestamp = Timestamp::new(format!("{}{prefix}", write.timestamp.as_str()));
        match &write.atom {
            Some(atom) => replica
                .set_atom_at(&write.address, atom.clone(), timestamp)
                .await
                .unwrap(),
            None => replica
                .delete_atom_at(&write.address, timestamp)
                .await
                .unwrap(),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn arbitrary_write_sets_converge(
        writes_a in leaf_writes(2, 6),
        writes_b in leaf_writes(2, 6),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let converged = runtime.block_on(async {
            let mut pool = ReplicaPool::new(2);
            let a = pool.add("a").unwrap();
            let b = pool.add("b").unwrap();
            apply(&a, "a", &writes_a).await;
            apply(&b, "b", &writes_b).await;

            pool.start_all().await.unwrap();
            let converged = pool.settle(Duration::from_secs(5)).await.unwrap();
            pool.stop_all().await.unwrap();
            converged
        });
        prop_assert!(converged);
    }
}
