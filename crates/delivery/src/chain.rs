//! # フォールバックチェーン
//!
//! 配信クラスごとの、優先順に並んだアダプタの列。
//!
//! 起動時に 1 度だけ組み立て、以後は `Arc<FallbackChain>` として読み取り専用で共有する。
//! 終端シンクは通常のリンクとは別に保持し、常に最後に試行されるため、
//! 並べ替えや取り除きによって最後尾から外れることはない。

use std::{fmt, sync::Arc, time::Duration};

use cascade_domain::delivery::DeliveryClass;
use cascade_infra::DeliveryAdapter;

/// チェーンの 1 リンク（アダプタとその期限）
#[derive(Clone)]
pub struct ChainLink {
    adapter:  Arc<dyn DeliveryAdapter>,
    deadline: Duration,
}

impl ChainLink {
    pub fn new(adapter: Arc<dyn DeliveryAdapter>, deadline: Duration) -> Self {
        Self { adapter, deadline }
    }

    pub fn adapter(&self) -> &Arc<dyn DeliveryAdapter> {
        &self.adapter
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainLink")
            .field("adapter", &self.name())
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// フォールバックチェーン
pub struct FallbackChain {
    class:               DeliveryClass,
    links:               Vec<ChainLink>,
    terminal:            Option<ChainLink>,
    inter_attempt_pause: Duration,
}

impl FallbackChain {
    pub fn builder(class: DeliveryClass) -> FallbackChainBuilder {
        FallbackChainBuilder {
            class,
            links: Vec::new(),
            terminal: None,
            inter_attempt_pause: Duration::ZERO,
        }
    }

    pub fn class(&self) -> DeliveryClass {
        self.class
    }

    /// 実アダプタのリンク（優先順）
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// 終端シンクのリンク
    pub fn terminal(&self) -> Option<&ChainLink> {
        self.terminal.as_ref()
    }

    /// 2 回目以降の試行の前に挟む待ち時間
    pub fn inter_attempt_pause(&self) -> Duration {
        self.inter_attempt_pause
    }

    /// 試行順のアダプタ名（終端シンクを含む）
    pub fn adapter_names(&self) -> Vec<&str> {
        self.links
            .iter()
            .chain(self.terminal.iter())
            .map(ChainLink::name)
            .collect()
    }
}

impl fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("class", &self.class)
            .field("adapters", &self.adapter_names())
            .field("inter_attempt_pause", &self.inter_attempt_pause)
            .finish()
    }
}

/// [`FallbackChain`] のビルダー
pub struct FallbackChainBuilder {
    class:               DeliveryClass,
    links:               Vec<ChainLink>,
    terminal:            Option<ChainLink>,
    inter_attempt_pause: Duration,
}

impl FallbackChainBuilder {
    /// 実アダプタを末尾に追加する
    ///
    /// 終端シンク（`is_terminal() == true`）を渡した場合は終端スロットに入る。
    pub fn link(mut self, adapter: Arc<dyn DeliveryAdapter>, deadline: Duration) -> Self {
        if adapter.is_terminal() {
            return self.terminal(adapter, deadline);
        }
        self.links.push(ChainLink::new(adapter, deadline));
        self
    }

    /// 終端シンクを設定する（既に設定されていれば置き換える）
    pub fn terminal(mut self, sink: Arc<dyn DeliveryAdapter>, deadline: Duration) -> Self {
        if let Some(previous) = &self.terminal {
            tracing::warn!(
                class = %self.class,
                previous = previous.name(),
                replacement = sink.name(),
                "終端シンクが複数指定されたため後者で置き換える"
            );
        }
        self.terminal = Some(ChainLink::new(sink, deadline));
        self
    }

    pub fn inter_attempt_pause(mut self, pause: Duration) -> Self {
        self.inter_attempt_pause = pause;
        self
    }

    pub fn build(self) -> FallbackChain {
        FallbackChain {
            class:               self.class,
            links:               self.links,
            terminal:            self.terminal,
            inter_attempt_pause: self.inter_attempt_pause,
        }
    }
}

/// 起動時に組み立てた配信クラスごとのチェーン
#[derive(Debug, Clone)]
pub struct DeliveryChains {
    pub email:        Arc<FallbackChain>,
    pub asset_upload: Arc<FallbackChain>,
}
