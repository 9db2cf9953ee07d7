use md_task_system::{Coordinator, ExecStatus, Task, TaskId};

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	thread,
	time::Duration,
};

use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod common;

use common::{within, CountingExecutor, Event, Key, Recorder};

const KEYS: [Key; 3] = ["a", "b", "c"];

#[derive(Default)]
struct KeyStats {
	running: AtomicUsize,
	max_running: AtomicUsize,
}

fn observed_task(stats: &Arc<KeyStats>, ran: &Arc<AtomicBool>) -> Task<&'static str, u32> {
	let stats = Arc::clone(stats);
	let ran = Arc::clone(ran);

	Task::new(move |ctx| {
		ran.store(true, Ordering::SeqCst);
		let now_running = stats.running.fetch_add(1, Ordering::SeqCst) + 1;
		stats.max_running.fetch_max(now_running, Ordering::SeqCst);

		thread::sleep(Duration::from_millis(rand::thread_rng().gen_range(0..4)));

		stats.running.fetch_sub(1, Ordering::SeqCst);
		if ctx.is_cancelled() {
			ExecStatus::Canceled
		} else {
			ExecStatus::Done("done")
		}
	})
}

#[test]
fn one_task_per_key_and_no_task_loss() {
	std::env::set_var("RUST_LOG", "info,md_task_system=warn");

	tracing_subscriber::fmt()
		.with_file(true)
		.with_line_number(true)
		.with_env_filter(EnvFilter::from_default_env())
		.try_init()
		.ok();

	tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.unwrap()
		.block_on(async move {
			let executor = CountingExecutor::new();
			let mut coordinator = Coordinator::new(Recorder::default(), executor.clone());

			let stats = KEYS
				.iter()
				.map(|key| (*key, Arc::new(KeyStats::default())))
				.collect::<HashMap<_, _>>();
			let mut submitted = HashMap::<TaskId, (Key, Arc<AtomicBool>)>::new();

			let mut rng = rand::thread_rng();
			for i in 0..90 {
				let key = KEYS[rng.gen_range(0..KEYS.len())];
				let ran = Arc::new(AtomicBool::new(false));
				let task = observed_task(&stats[key], &ran);
				submitted.insert(task.id(), (key, ran));

				coordinator.submit(key, task).unwrap();

				if rng.gen_bool(0.3) {
					thread::sleep(Duration::from_millis(rng.gen_range(0..3)));
				}
				coordinator.process_ready().unwrap();

				if i % 30 == 0 {
					info!(%i, active = coordinator.active_keys().count(), "submitting...");
				}
			}

			while !coordinator.is_idle() {
				within(coordinator.process_next()).await.unwrap();
			}

			for (key, stats) in &stats {
				assert!(
					stats.max_running.load(Ordering::SeqCst) <= 1,
					"key {key} had concurrent bodies"
				);
			}

			let mut terminal = HashMap::<TaskId, usize>::new();
			let mut dispatched = 0;
			for event in &coordinator.listener().events {
				match event {
					Event::Finished(key, id) => {
						assert_eq!(submitted[id].0, *key);
						assert!(submitted[id].1.load(Ordering::SeqCst), "finished without running");
						*terminal.entry(*id).or_default() += 1;
						dispatched += 1;
					}
					// canceled before the body started is fine, the body then never runs
					Event::Cancelled(key, id) => {
						assert_eq!(submitted[id].0, *key);
						*terminal.entry(*id).or_default() += 1;
						dispatched += 1;
					}
					Event::Preempted(key, id) => {
						assert_eq!(submitted[id].0, *key);
						assert!(!submitted[id].1.load(Ordering::SeqCst), "preempted task ran");
						*terminal.entry(*id).or_default() += 1;
					}
					Event::Progress(..) => {}
				}
			}

			assert_eq!(terminal.len(), submitted.len());
			assert!(terminal.values().all(|count| *count == 1));

			assert_eq!(dispatched, executor.executed());
		});
}
