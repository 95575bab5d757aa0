use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parlor::core::app::{App, AppAction, AppCommand};
use parlor::core::chat_stream::StreamEvent;
use parlor::core::conversation::ConversationStore;
use parlor::core::message::{GroundingSource, Message};
use parlor::core::persona::PersonaManager;
use parlor::core::storage::MemorySnapshotStorage;
use parlor::ui::transcript::render_transcript;

fn make_messages(n_pairs: usize, base: &str) -> Vec<Message> {
    let mut v = Vec::with_capacity(n_pairs * 2);
    for i in 0..n_pairs {
        v.push(Message::user(format!("u{i}"), base));
        let mut reply = Message::assistant(format!("a{i}"), "SAYANBOT", base);
        if i % 4 == 0 {
            reply.grounding_metadata = Some(vec![GroundingSource {
                title: "Example".into(),
                uri: format!("https://example.test/{i}"),
            }]);
        }
        v.push(reply);
    }
    v
}

fn fresh_app() -> App {
    let store = ConversationStore::load(Box::new(MemorySnapshotStorage::new()));
    match App::new(store, PersonaManager::load_personas(&[]), None) {
        Ok(app) => app,
        Err(err) => panic!("default persona missing: {err}"),
    }
}

fn bench_transcript_render(c: &mut Criterion) {
    let base = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor incididunt ut labore et dolore magna aliqua";

    for &pairs in &[100usize, 400usize] {
        let messages = make_messages(pairs, base);
        let mut group = c.benchmark_group(format!("transcript_pairs{}", pairs));
        group.throughput(Throughput::Elements(messages.len() as u64));

        group.bench_function(BenchmarkId::new("render", pairs), |b| {
            b.iter(|| render_transcript(&messages))
        });
        group.finish();
    }

    // Streaming-like scenario: each delta rewrites the placeholder and commits.
    let mut group = c.benchmark_group("reducer_stream");
    for &deltas in &[50usize, 200usize] {
        group.throughput(Throughput::Elements(deltas as u64));
        group.bench_function(BenchmarkId::new("text_deltas", deltas), |b| {
            b.iter(|| {
                let mut app = fresh_app();
                let stream_id = match app.handle_action(AppAction::SubmitMessage {
                    text: "tell me a story".into(),
                }) {
                    Some(AppCommand::SpawnStream { stream_id, .. }) => stream_id,
                    _ => return,
                };
                for _ in 0..deltas {
                    app.handle_action(AppAction::StreamEvent {
                        event: StreamEvent::Text("word ".into()),
                        stream_id,
                    });
                }
                app.handle_action(AppAction::StreamCompleted { stream_id });
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_transcript_render);
criterion_main!(benches);
