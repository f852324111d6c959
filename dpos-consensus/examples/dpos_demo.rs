//! Example demonstrating DPoS block production and verification

use dpos_consensus::{config::default_test_genesis, ChainConfig, DposEngine};
use dpos_core::{Address, Block, KeypairSigner, PayloadType, Signer, Transaction, TRANSACTION_GAS_PRICE};
use dpos_pool::TransactionPool;
use dpos_storage::MemoryStorage;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🦀 DPoS Consensus Demo");
    println!("======================");

    // Build a dynasty whose members we hold keys for
    println!("\n1. Seeding the genesis dynasty...");
    let config = ChainConfig::default();
    let mut signers: Vec<KeypairSigner> = (1..=config.dynasty_size as u8)
        .map(|i| KeypairSigner::from_secret_bytes(&[i; 32]))
        .collect::<Result<_, _>>()?;
    signers.sort_by_key(|s| *s.address().as_bytes());

    let mut genesis = default_test_genesis(config.dynasty_size);
    genesis.dynasty = signers.iter().map(|s| s.address().to_hex()).collect();
    println!("   Dynasty members: {}", genesis.dynasty.len());

    // Boot the engine against fresh storage
    println!("\n2. Booting the engine...");
    let storage = Arc::new(MemoryStorage::new());
    let mut engine = DposEngine::new(config, storage)?;
    engine.setup(&genesis)?;

    let genesis_state = engine.genesis_state(&genesis)?;
    let genesis_block = Block::genesis(genesis.chain_id, genesis_state.root_hash());
    println!("   Genesis consensus root: {}", genesis_state.root_hash());

    // The slot 15 seconds after genesis belongs to the second member
    println!("\n3. Deriving the next proposer...");
    let members = genesis_state.dynasty()?;
    let next = genesis_state.next_state(15)?;
    println!("   Proposer at +15s: {}", next.proposer());
    assert_eq!(next.proposer(), members[1]);

    let miner = signers
        .iter()
        .find(|s| s.address() == members[1])
        .expect("dynasty member has a known key")
        .clone();
    engine.set_miner(Arc::new(miner));

    // Fill the pool with a few pending transactions
    println!("\n4. Admitting transactions...");
    let pool = TransactionPool::new(genesis.chain_id, 64);
    let sender = KeypairSigner::from_secret_bytes(&[0x99; 32])?;
    for nonce in 1..=3u64 {
        let mut tx = Transaction::new(
            genesis.chain_id,
            sender.address(),
            Address::zero(),
            1000,
            nonce,
            PayloadType::Binary,
            vec![],
            TRANSACTION_GAS_PRICE,
            21_000,
        )?;
        tx.sign(&[0x99; 32])?;
        pool.push(tx)?;
    }
    println!("   Pool size: {}", pool.len());

    // Mint the block for our slot and verify it like a receiving node
    println!("\n5. Proposing and verifying a block...");
    let block = engine.propose_block(&genesis_block, genesis_block.header.timestamp + 15, &pool)?;
    println!("   Sealed block #{} with {} txs", block.header.height, block.transactions.len());

    engine.verify_block(&block, &genesis_block)?;
    println!("   Verification passed for proposer {}", block.header.consensus_root.proposer);

    println!("\n✅ All operations completed successfully!");
    Ok(())
}
