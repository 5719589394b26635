use clap::Parser;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use medimind_common::{AnalysisResult, GroundingChunk};
use medimind_rust::analyzer::{
    self, services, AnalysisProgress, AnalysisRequest, CaseSession, GeminiClient,
    GenerationOptions, HistoryContextPolicy,
};
use medimind_rust::{cli, config, error, history, scanner};
use cli::{Cli, Commands, HistoryAction};
use config::Config;
use error::{MediMindError, Result};
use history::HistoryStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;

    match cli.command {
        Commands::Analyze { paths, patient, case, chunk_size, recursive, resend_history, output } => {
            println!("🩺 medimind - 臨床文書解析\n");

            let mut store = HistoryStore::open(config.history_path()?);
            let mut session = match case {
                Some(id) => {
                    let session = open_case(&store, &id)?;
                    if !session.patient_name.trim().eq_ignore_ascii_case(patient.trim()) {
                        tracing::warn!(
                            stored = %session.patient_name,
                            given = %patient,
                            "患者名が保存済みの症例と異なります。保存済みの名前を使用します"
                        );
                    }
                    session
                }
                None => CaseSession::new(patient),
            };

            // 1. 文書スキャン
            println!("[1/3] 文書をスキャン中...");
            let documents = scanner::scan_paths(&paths, recursive)?;
            let images = documents.iter().filter(|d| scanner::is_image(&d.mime_type)).count();
            println!("✔ {}件の文書を検出（画像 {}件）\n", documents.len(), images);

            // 2. AI解析
            let client = GeminiClient::from_config(&config)?;
            let request = AnalysisRequest {
                documents,
                prior_context: session.current_report().map(str::to_string),
                chunk_size: chunk_size.unwrap_or(config.chunk_size),
                history_policy: if resend_history {
                    HistoryContextPolicy::EveryChunk
                } else {
                    HistoryContextPolicy::FirstChunkOnly
                },
                options: GenerationOptions::report(&config),
            };
            println!("[2/3] AI解析中...{}", if request.prior_context.is_some() { " (既存レポートに統合)" } else { "" });

            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );

            let outcome = analyzer::run_analysis(&client, &mut store, &mut session, request, |event| match event {
                AnalysisProgress::ChunkStarted { total, files, .. } => {
                    pb.set_length(total as u64);
                    pb.set_message(format!("{}件送信中", files.len()));
                }
                AnalysisProgress::ChunkCompleted { index, total, checkpoint } => {
                    pb.inc(1);
                    pb.println(format!(
                        "  ✔ チェックポイント {}/{}: {}件{}",
                        index + 1,
                        total,
                        checkpoint.files_analysed.len(),
                        if checkpoint.is_red_code { " 🚨" } else { "" }
                    ));
                }
            })
            .await;
            pb.finish_and_clear();

            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    println!("✖ 解析が中断されました（完了したチェックポイント: {}件）", session.checkpoints.len());
                    return Err(e);
                }
            };
            println!("✔ 解析完了\n");

            // 3. 結果出力
            println!("[3/3] 結果を保存中...");
            print_red_code(&result);
            if let Some(path) = output {
                std::fs::write(&path, &result.markdown)?;
                println!("✔ レポートを保存: {}", path.display());
            }
            if let Some(id) = &session.case_id {
                println!("✔ 症例を保存: {}", id);
            }

            println!("\n✅ 解析完了");
        }

        Commands::History { action } => {
            let mut store = HistoryStore::open(config.history_path()?);
            run_history(&mut store, action)?;
        }

        Commands::Chat { case, message } => {
            let mut store = HistoryStore::open(config.history_path()?);
            let mut session = open_case(&store, &case)?;
            let client = GeminiClient::from_config(&config)?;

            let outcome = services::chat(&client, &config, &mut session, &message).await;
            // エラーメッセージも会話に残す
            session.save(&mut store)?;
            let reply = outcome?;

            println!("{}", reply.text);
            print_sources(reply.grounding_chunks.as_deref().unwrap_or_default());
        }

        Commands::Research { case } => {
            println!("🔎 medimind - エビデンス調査\n");
            let mut store = HistoryStore::open(config.history_path()?);
            let mut session = open_case(&store, &case)?;
            let client = GeminiClient::from_config(&config)?;

            let report = session.current_report().unwrap_or_default().to_string();
            let research = services::deep_research(&client, &config, &report).await?;
            println!("{}", research);

            if let Some(result) = session.result.as_mut() {
                result.deep_research_markdown = Some(research);
            }
            session.save(&mut store)?;
        }

        Commands::Summary { case } => {
            println!("📝 medimind - サマリー作成\n");
            let mut store = HistoryStore::open(config.history_path()?);
            let mut session = open_case(&store, &case)?;
            let client = GeminiClient::from_config(&config)?;

            let report = session.current_report().unwrap_or_default().to_string();
            let summary = services::generate_short_summary(&client, &config, &report).await?;
            println!("{}", summary);

            session.extended_history = Some(summary);
            session.save(&mut store)?;
        }

        Commands::Simulate { case, intervention } => {
            println!("🧪 medimind - What-if シミュレーション\n");
            let store = HistoryStore::open(config.history_path()?);
            let session = open_case(&store, &case)?;
            let client = GeminiClient::from_config(&config)?;

            let report = session.current_report().unwrap_or_default();
            let sim = services::run_what_if_simulation(&client, &config, &intervention, report).await?;

            println!("  介入: {}", sim.treatment_name);
            println!("  有効率: {:.0}%", sim.efficacy_rate);
            println!("  副作用リスク: {:.0}%", sim.side_effect_risk);
            println!("  信頼度: {:.0}%", sim.confidence_rate);
            println!("  予測: {}", sim.predicted_outcome);
        }

        Commands::Scribe { case, transcript } => {
            println!("🎙 medimind - スクライブ\n");
            let mut store = HistoryStore::open(config.history_path()?);
            let mut session = open_case(&store, &case)?;
            let client = GeminiClient::from_config(&config)?;

            let text = std::fs::read_to_string(&transcript)
                .map_err(|_| MediMindError::FileNotFound(transcript.display().to_string()))?;

            match services::process_scribe_session(&client, &config, &text).await? {
                Some(scribe) => {
                    println!("  Anamnesi: {}", scribe.anamnesis);
                    println!("  Sintomi: {}", scribe.symptoms);
                    println!("  Piano: {}", scribe.plan);
                    if let Some(result) = session.result.as_mut() {
                        result.scribe = Some(scribe);
                    }
                    session.save(&mut store)?;
                }
                None => println!("構造化データを取得できませんでした"),
            }
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  モデル: {}", config.model);
                println!("  要約モデル: {}", config.summary_model);
                println!("  チャンクサイズ: {}", config.chunk_size);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  履歴ファイル: {}", config.history_path()?.display());
                println!("  APIキー: {}", if config.get_api_key().is_ok() { "設定済み" } else { "未設定" });
            }
        }
    }

    Ok(())
}

/// ログ初期化（RUST_LOG が優先）
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn open_case(store: &HistoryStore, id: &str) -> Result<CaseSession> {
    store
        .get(id)
        .map(CaseSession::from_record)
        .ok_or_else(|| MediMindError::CaseNotFound(id.to_string()))
}

fn run_history(store: &mut HistoryStore, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List => {
            if store.is_empty() {
                println!("症例はありません");
                return Ok(());
            }
            println!("症例一覧（{}件）:", store.len());
            for record in store.load_all() {
                println!(
                    "  {}  {}  {}  文書{}件{}",
                    record.id,
                    analyzer::format_date(record.timestamp),
                    record.patient_name,
                    record.file_names.len(),
                    if record.result.is_red_code { "  🚨" } else { "" }
                );
            }
        }

        HistoryAction::Show { id } => {
            let session = open_case(store, &id)?;
            println!("患者: {}", session.patient_name);
            println!("文書: {}", session.file_names.join(", "));
            println!("チェックポイント: {}件", session.checkpoints.len());
            println!("チャット: {}件\n", session.chat_history.len());
            if let Some(result) = &session.result {
                print_red_code(result);
                println!("{}", result.markdown);
                print_sources(result.grounding_chunks.as_deref().unwrap_or_default());
            }
            if let Some(summary) = &session.extended_history {
                println!("\n--- Executive Summary ---\n{}", summary);
            }
        }

        HistoryAction::Remove { id } => {
            if store.remove(&id)? {
                println!("✔ 症例を削除しました: {}", id);
            } else {
                return Err(MediMindError::CaseNotFound(id));
            }
        }

        HistoryAction::Export { output } => {
            let path = output.unwrap_or_else(|| {
                PathBuf::from(history::backup_file_name(chrono::Local::now().date_naive()))
            });
            std::fs::write(&path, store.export_all()?)?;
            println!("✔ {}件をエクスポート: {}", store.len(), path.display());
        }

        HistoryAction::Import { file } => {
            let bytes = std::fs::read(&file)
                .map_err(|_| MediMindError::FileNotFound(file.display().to_string()))?;
            let count = store.import_all(&bytes)?;
            println!("✔ {}件をインポートしました", count);
        }

        HistoryAction::Clear { yes } => {
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("{}件の症例をすべて削除しますか?", store.len()))
                    .default(false)
                    .interact()
                    .map_err(|e| MediMindError::Io(std::io::Error::other(e.to_string())))?;

            if confirmed {
                store.clear()?;
                println!("✔ 履歴を削除しました");
            } else {
                println!("中止しました");
            }
        }
    }

    Ok(())
}

fn print_red_code(result: &AnalysisResult) {
    if let Some(reason) = &result.red_code_reason {
        println!("🚨 RED CODE: {}", reason);
    }
}

fn print_sources(chunks: &[GroundingChunk]) {
    let sources: Vec<_> = chunks.iter().filter_map(|c| c.web.as_ref()).collect();
    if sources.is_empty() {
        return;
    }
    println!("\n出典:");
    for web in sources {
        println!("  - {} ({})", web.title, web.uri);
    }
}
