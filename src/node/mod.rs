// Node orchestrator: mining tick, inbound request routing, fork
// reconciliation. Ties together the chain view (§ consensus), the
// mempool, and the peer transport behind a single mutex that guards the
// candidate block and the in-flight mining signal, mirroring the source's
// one-big-struct node loop but with the chain↔block back-reference
// inverted (see `consensus::chain`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::{SEPARATOR, TXS_LIMIT};
use crate::consensus::chain::ChainView;
use crate::consensus::engine::{self, CancelToken, SleepFlag, SleepState};
use crate::crypto::address::{decode_address_string, derive_address, encode_address_string, ADDRESS_BYTES};
use crate::crypto::signing::{PublicKey, SecretKey};
use crate::error::{MiningError, NodeError};
use crate::mempool::MemPool;
use crate::net::protocol::{Opcode, Packet};
use crate::net::transport;
use crate::primitives::{BalanceOracle, Block, Transaction};
use crate::store::ChainDB;

/// Peers awake-count strictly greater than this many triggers a PoW grind;
/// the source's literal condition is `awake-count > 1`, i.e. quorum = 1.
const DEFAULT_QUORUM: usize = 1;

struct MiningState {
    candidate: Block,
    /// The hash a block currently being mined is expected to commit to —
    /// published via GET_LHASH so clients anchor new transactions to the
    /// tip under construction, not the last committed one.
    probable_last_hash: Option<[u8; 32]>,
    cancel: Option<CancelToken>,
}

pub struct Node {
    chain: RwLock<Arc<ChainView>>,
    data_dir: PathBuf,
    mempool: MemPool,
    state: Mutex<MiningState>,
    sleep_flag: SleepFlag,
    peers: Vec<SocketAddr>,
    quorum: usize,
    miner_pk: PublicKey,
    miner_sk: SecretKey,
    miner_addr: [u8; ADDRESS_BYTES],
}

impl Node {
    pub fn open(
        data_dir: impl Into<PathBuf>,
        peers: Vec<SocketAddr>,
        miner_pk: PublicKey,
        miner_sk: SecretKey,
    ) -> Result<Arc<Node>, NodeError> {
        let data_dir = data_dir.into();
        let miner_addr = derive_address(&miner_pk);
        let chain = ChainView::open(data_dir.join("chaindata"), miner_addr)?;
        let candidate = Block::new(miner_addr, chain.last_hash());

        Ok(Arc::new(Node {
            chain: RwLock::new(Arc::new(chain)),
            data_dir,
            mempool: MemPool::new(),
            state: Mutex::new(MiningState { candidate, probable_last_hash: None, cancel: None }),
            sleep_flag: SleepFlag::new(),
            peers,
            quorum: DEFAULT_QUORUM,
            miner_pk,
            miner_sk,
            miner_addr,
        }))
    }

    pub fn mempool(&self) -> &MemPool {
        &self.mempool
    }

    fn chain(&self) -> Arc<ChainView> {
        self.chain.read().expect("chain lock poisoned").clone()
    }

    fn probable_or_last_hash(&self, chain: &ChainView) -> [u8; 32] {
        self.state.lock().expect("node lock poisoned").probable_last_hash.unwrap_or_else(|| chain.last_hash())
    }

    fn cancel_mining(&self) {
        if let Some(cancel) = &self.state.lock().expect("node lock poisoned").cancel {
            cancel.cancel();
        }
    }

    fn reset_candidate(&self, chain: &ChainView) {
        let mut state = self.state.lock().expect("node lock poisoned");
        state.candidate = Block::new(self.miner_addr, chain.last_hash());
        state.probable_last_hash = None;
        state.cancel = None;
    }

    /// Binds the peer transport and runs the mining tick forever. Spawns
    /// both onto the current Tokio runtime and blocks until either fails.
    pub async fn run(self: Arc<Self>, bind_addr: SocketAddr) -> Result<(), NodeError> {
        let listener_self = self.clone();
        let listener = tokio::spawn(async move {
            transport::listen(bind_addr, move |pkt: Packet| {
                let node = listener_self.clone();
                async move { node.handle_packet(pkt).await }
            })
            .await
        });

        let ticker_self = self.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                interval.tick().await;
                if let Err(e) = ticker_self.mining_tick().await {
                    log::error!("mining tick failed: {e}");
                }
            }
        });

        tokio::select! {
            res = listener => { res.map_err(|_| NodeError::Transport(crate::error::TransportError::Dial))?? }
            _ = ticker => {}
        }
        Ok(())
    }

    async fn handle_packet(self: Arc<Self>, pkt: Packet) -> Packet {
        match Opcode::from_i32(pkt.option) {
            Some(Opcode::AddBlock) => self.handle_add_block(&pkt.data).await,
            Some(Opcode::AddTrnsx) => self.handle_add_trnsx(&pkt.data),
            Some(Opcode::GetBlock) => self.handle_get_block(&pkt.data),
            Some(Opcode::GetLHash) => self.handle_get_lhash(),
            Some(Opcode::GetBlnce) => self.handle_get_blnce(&pkt.data),
            Some(Opcode::Wakeup) => self.handle_wakeup(),
            None => Packet::reply("fail"),
        }
    }

    async fn handle_add_block(self: &Arc<Self>, payload: &str) -> Packet {
        let parts: Vec<&str> = payload.splitn(3, SEPARATOR).collect();
        let [_sender_addr, sender_height_str, block_json] = parts[..] else {
            return Packet::reply("fail");
        };
        let Ok(sender_height) = sender_height_str.parse::<u64>() else {
            return Packet::reply("fail");
        };
        let Ok(block) = serde_json::from_str::<Block>(block_json) else {
            return Packet::reply("fail");
        };

        let chain = self.chain();
        let height = chain.size() + 1;
        let prev = if height > 1 { chain.get_by_height(height - 1).unwrap_or(None) } else { None };

        if block.is_valid(chain.as_ref(), prev.as_ref(), height).is_ok() {
            self.cancel_mining();
            if let Err(e) = chain.append(&block) {
                log::error!("failed to append inbound block: {e}");
                return Packet::reply("fail");
            }
            self.reset_candidate(&chain);
            Packet::reply("ok")
        } else if sender_height > chain.size() {
            log::info!("fork reconciliation triggered: local height={} remote height={}", chain.size(), sender_height);
            chain.adopt_difficulty(block.difficulty);
            self.cancel_mining();
            let node = self.clone();
            tokio::spawn(async move { node.reconcile(sender_height).await });
            Packet::reply("ok")
        } else {
            log::warn!("inbound block rejected: {:?}", block.is_valid(chain.as_ref(), prev.as_ref(), height));
            Packet::reply("fail")
        }
    }

    fn handle_add_trnsx(&self, payload: &str) -> Packet {
        match serde_json::from_str::<Transaction>(payload) {
            Ok(tx) => {
                self.mempool.add(tx);
                Packet::reply("ok")
            }
            Err(_) => Packet::reply("fail"),
        }
    }

    fn handle_get_block(&self, payload: &str) -> Packet {
        let Ok(wire_height) = payload.trim().parse::<u64>() else {
            return Packet::reply("");
        };
        match self.chain().get_by_height(wire_height + 1) {
            Ok(Some(block)) => Packet::reply(serde_json::to_string(&block).unwrap_or_default()),
            _ => Packet::reply(""),
        }
    }

    fn handle_get_lhash(&self) -> Packet {
        let chain = self.chain();
        let hash = self.probable_or_last_hash(&chain);
        Packet::reply(encode_address_string(&hash))
    }

    fn handle_get_blnce(&self, payload: &str) -> Packet {
        match decode_address_string(payload.trim()) {
            Ok(addr) => {
                let chain = self.chain();
                Packet::reply(chain.balance(&addr, chain.size()).to_string())
            }
            Err(_) => Packet::reply("0"),
        }
    }

    fn handle_wakeup(&self) -> Packet {
        match self.sleep_flag.get() {
            SleepState::Awake => Packet::reply("awake"),
            SleepState::Sleeping => Packet::reply("asleep"),
        }
    }

    async fn probe_peers_awake(&self) -> usize {
        let mut awake = 0;
        for addr in &self.peers {
            let probe = transport::send(*addr, &Packet::new(Opcode::Wakeup, ""));
            if let Ok(reply) = probe.await {
                if reply.data == "awake" {
                    awake += 1;
                }
            }
        }
        awake
    }

    async fn broadcast_add_block(&self, block: &Block) {
        let body = serde_json::to_string(block).unwrap_or_default();
        let sender = encode_address_string(&self.miner_addr);
        let height = self.chain().size();
        let payload = format!("{sender}{SEPARATOR}{height}{SEPARATOR}{body}");
        for addr in &self.peers {
            let addr = *addr;
            let pkt = Packet::new(Opcode::AddBlock, payload.clone());
            tokio::spawn(async move {
                let _ = transport::send(addr, &pkt).await;
            });
        }
    }

    /// Drains mempool into the candidate, seals it once full, and commits
    /// if the tip has not moved underneath it. Runs once per second.
    pub async fn mining_tick(self: &Arc<Self>) -> Result<(), NodeError> {
        let chain = self.chain();
        let anchor = self.probable_or_last_hash(&chain);
        self.mempool.update_for_new_tip(anchor);

        if self.mempool.size() < TXS_LIMIT {
            return Ok(());
        }

        let seal_job = {
            let mut state = self.state.lock().expect("node lock poisoned");
            let need = TXS_LIMIT.saturating_sub(state.candidate.transactions.len());
            if need > 0 {
                let height = chain.size() + 1;
                for tx in self.mempool.take(need) {
                    if let Err(e) = state.candidate.add_transaction(chain.as_ref(), tx, height) {
                        log::warn!("mempool tx rejected during block assembly: {e}");
                    }
                }
            }

            if state.candidate.transactions.len() < TXS_LIMIT {
                None
            } else {
                let height = chain.size() + 1;
                if let Err(e) = state.candidate.accept(chain.as_ref(), height, &self.miner_sk) {
                    log::warn!("accept failed: {e}");
                    None
                } else {
                    state.probable_last_hash = Some(state.candidate.curr_hash);
                    let cancel = CancelToken::new();
                    state.cancel = Some(cancel.clone());
                    Some((state.candidate.clone(), cancel))
                }
            }
        };

        let Some((mut candidate, cancel)) = seal_job else {
            return Ok(());
        };

        self.sleep_flag.set(SleepState::Sleeping);
        let awake_count = self.probe_peers_awake().await;
        let seal_result = engine::seal_block(&mut candidate, &cancel, awake_count, self.quorum).await;
        self.sleep_flag.set(SleepState::Awake);

        match seal_result {
            Ok(outcome) => {
                log::debug!("block sealed: ran_pow={}", outcome.ran_pow);
                let chain = self.chain();
                let tip_unchanged = candidate.prev_hash == chain.last_hash();
                if tip_unchanged {
                    chain.append(&candidate)?;
                    self.broadcast_add_block(&candidate).await;
                } else {
                    log::info!("sealed candidate discarded: tip advanced during mining");
                }
                self.reset_candidate(&chain);
            }
            Err(MiningError::Cancelled) => {
                log::info!("mining attempt cancelled");
                let mut state = self.state.lock().expect("node lock poisoned");
                state.cancel = None;
            }
        }
        Ok(())
    }

    /// Downloads genesis..tip from the peer that advertised a longer chain
    /// into a scratch store, then swaps it in as the node's current view.
    /// Any failed fetch abandons the scratch store and leaves the local
    /// chain untouched.
    async fn reconcile(self: Arc<Self>, remote_height: u64) {
        let Some(peer) = self.peers.first().copied() else {
            log::warn!("fork reconciliation has no peer to fetch from");
            return;
        };

        let scratch_path = self.data_dir.join(format!("chaindata.scratch.{remote_height}"));
        let _ = std::fs::remove_dir_all(&scratch_path);
        let scratch_db = match ChainDB::open(&scratch_path) {
            Ok(db) => db,
            Err(e) => {
                log::error!("fork reconciliation could not open scratch store: {e}");
                return;
            }
        };

        for wire_height in 0..remote_height {
            let pkt = Packet::new(Opcode::GetBlock, wire_height.to_string());
            let reply = match transport::send(peer, &pkt).await {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("fork reconciliation aborted at height {wire_height}: {e}");
                    let _ = std::fs::remove_dir_all(&scratch_path);
                    return;
                }
            };
            if reply.data.is_empty() {
                log::warn!("fork reconciliation aborted: peer has no block at height {wire_height}");
                let _ = std::fs::remove_dir_all(&scratch_path);
                return;
            }
            let block = match serde_json::from_str::<Block>(&reply.data) {
                Ok(b) => b,
                Err(e) => {
                    log::warn!("fork reconciliation aborted: malformed block at height {wire_height}: {e}");
                    let _ = std::fs::remove_dir_all(&scratch_path);
                    return;
                }
            };
            if let Err(e) = scratch_db.append(&block) {
                log::error!("fork reconciliation append failed at height {wire_height}: {e}");
                let _ = std::fs::remove_dir_all(&scratch_path);
                return;
            }
        }

        let difficulty = self.chain().difficulty();
        let new_view = Arc::new(ChainView::from_store(Arc::new(scratch_db), difficulty));
        *self.chain.write().expect("chain lock poisoned") = new_view.clone();
        self.reset_candidate(&new_view);
        log::info!("fork reconciliation finished: new height={}", new_view.size());
    }
}
