use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medimind")]
#[command(about = "臨床文書AI解析・症例管理ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 臨床文書を解析してレポートを作成
    Analyze {
        /// 文書ファイルまたはフォルダ（複数可）
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// 患者名
        #[arg(short, long)]
        patient: String,

        /// 既存の症例IDに追加解析する
        #[arg(short, long)]
        case: Option<String>,

        /// チャンクサイズ（1回に送る文書数、省略時は設定値）
        #[arg(long)]
        chunk_size: Option<usize>,

        /// サブフォルダも再帰的にスキャン
        #[arg(short = 'r', long)]
        recursive: bool,

        /// 経時比較コンテキストを全チャンクで送る
        #[arg(long)]
        resend_history: bool,

        /// レポート（Markdown）の出力先
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 症例履歴の管理
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// 症例についてAIに質問
    Chat {
        /// 症例ID
        #[arg(long)]
        case: String,

        /// 質問
        #[arg(required = true)]
        message: String,
    },

    /// 最新エビデンスの調査
    Research {
        /// 症例ID
        #[arg(long)]
        case: String,
    },

    /// エグゼクティブサマリーを作成
    Summary {
        /// 症例ID
        #[arg(long)]
        case: String,
    },

    /// 治療介入の what-if シミュレーション
    Simulate {
        /// 症例ID
        #[arg(long)]
        case: String,

        /// 介入内容
        #[arg(required = true)]
        intervention: String,
    },

    /// 診察の書き起こしを構造化
    Scribe {
        /// 症例ID
        #[arg(long)]
        case: String,

        /// 書き起こしテキストファイル
        #[arg(required = true)]
        transcript: PathBuf,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// 症例一覧（新しい順）
    List,

    /// 症例の詳細を表示
    Show {
        /// 症例ID
        id: String,
    },

    /// 症例を削除
    Remove {
        /// 症例ID
        id: String,
    },

    /// 全症例をJSONでエクスポート
    Export {
        /// 出力ファイル（デフォルト: MediMind_Backup_<日付>.json）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// バックアップから全症例を置き換え
    Import {
        /// バックアップJSONファイル
        file: PathBuf,
    },

    /// 全症例を削除
    Clear {
        /// 確認をスキップ
        #[arg(short, long)]
        yes: bool,
    },
}
