//! # トランスポート探索
//!
//! 既知の2つのソケットパスの存在のみを確認し、利用すべきバックエンドを決定する。
//! 接続は試みない（接続とそのレイテンシはバックエンドクライアントの責務）。
//!
//! ソケットの有無はリクエストごとに変わり得るため、結果はキャッシュしない。

use std::path::{Path, PathBuf};

use attest_types::TransportKind;

use crate::config::SocketPaths;

/// 探索結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendDescriptor {
    /// 実機バックエンドのソケットが存在する
    Real {
        /// 通信プロトコル
        transport: TransportKind,
        /// ソケットパス
        socket_path: PathBuf,
    },
    /// 利用可能なソケットがない（正常な結果）
    Unavailable,
}

impl BackendDescriptor {
    /// 出自に記録するバックエンド名。`Unavailable` の場合は `None`。
    pub fn source(&self) -> Option<&'static str> {
        match self {
            BackendDescriptor::Real { transport, .. } => Some(source_name(*transport)),
            BackendDescriptor::Unavailable => None,
        }
    }
}

/// トランスポート種別ごとのバックエンド名。
pub fn source_name(transport: TransportKind) -> &'static str {
    match transport {
        TransportKind::SocketRpc => "dstack",
        TransportKind::SocketHttp => "tappd",
    }
}

/// 各ソケットの有無。1リクエストにつき1回だけ確認し、
/// バックエンドの選択と応答中の `*_available` はこの結果から導く。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    /// プライマリソケットが存在する
    pub dstack: bool,
    /// セカンダリソケットが存在する
    pub tappd: bool,
}

impl Availability {
    /// 各ソケットの有無を個別に確認する。
    pub fn check(sockets: &SocketPaths) -> Self {
        Self {
            dstack: socket_exists(&sockets.primary),
            tappd: socket_exists(&sockets.secondary),
        }
    }

    /// 優先順位（プライマリ → セカンダリ）に従ってバックエンドを選択する。
    /// ファイルシステムは再確認しない。
    pub fn probe(&self, sockets: &SocketPaths) -> BackendDescriptor {
        if self.dstack {
            BackendDescriptor::Real {
                transport: TransportKind::SocketRpc,
                socket_path: sockets.primary.clone(),
            }
        } else if self.tappd {
            BackendDescriptor::Real {
                transport: TransportKind::SocketHttp,
                socket_path: sockets.secondary.clone(),
            }
        } else {
            BackendDescriptor::Unavailable
        }
    }
}

/// ソケットの有無を確認し、バックエンドを選択する。
pub fn probe(sockets: &SocketPaths) -> (Availability, BackendDescriptor) {
    let availability = Availability::check(sockets);
    let descriptor = availability.probe(sockets);
    (availability, descriptor)
}

fn socket_exists(path: &Path) -> bool {
    path.exists()
}
