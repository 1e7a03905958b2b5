#![allow(unused)]
extern crate scpfwk;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use scpfwk::os::host::{HostInterrupts, HostOs};
use scpfwk::os::{Signals, WaitMode};
use scpfwk::prelude::*;
use scpfwk::utils::synchronization::FlagRegister;
use std::{
    hint::black_box,
    sync::{
        mpsc::{channel, Sender},
        Arc, Mutex,
    },
};

/// Benchmark building a request and its response shell
fn bench_event_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_record");
    group.throughput(Throughput::Elements(1));
    group.bench_function("request_and_response_shell", |b| {
        b.iter(|| {
            let request = Event::new(Id::event(2, 0), Id::module(1), Id::element(2, 3))
                .with_param_u32(0, black_box(0xdead_beef))
                .with_response_requested();
            let response = request.response_shell();
            black_box(response.param_u32(0))
        });
    });
    group.finish();
}

/// Benchmark raising and consuming a signal on the hosted flag register
fn bench_flag_register(c: &mut Criterion) {
    let flags = FlagRegister::new();

    let mut group = c.benchmark_group("flag_register");
    group.bench_function("set_then_wait_any", |b| {
        b.iter(|| {
            flags.set(black_box(Signals::EVENT_TO_PROCESS)).unwrap();
            let matched = flags
                .wait(
                    Signals::EVENT_TO_PROCESS | Signals::NO_READY_THREAD,
                    WaitMode::Any,
                )
                .unwrap();
            black_box(matched)
        });
    });
    group.finish();
}

struct Echo {
    done: Mutex<Sender<u32>>,
}

impl EventHandler for Echo {
    fn process_event(&self, _: &Kernel, event: &Event, _: &mut Event) -> Result<()> {
        let _ = self
            .done
            .lock()
            .unwrap()
            .send(event.param_u32(0).unwrap_or(0));
        Ok(())
    }
}

/// Benchmark the latency of an interrupt event until its handler ran
///
/// One module runs on the common thread and one on a worker thread, so both
/// the direct path and the baton hand-off to a worker are measured.
fn bench_isr_round_trip(c: &mut Criterion) {
    let (tx, rx) = channel();

    let mut modules = ModuleRegistry::new();
    let local = modules.register(
        ModuleDesc::new(
            "local",
            Arc::new(Echo {
                done: Mutex::new(tx.clone()),
            }),
        )
        .with_events(1),
    );
    let worker = modules.register(
        ModuleDesc::new(
            "worker",
            Arc::new(Echo {
                done: Mutex::new(tx),
            }),
        )
        .with_events(1),
    );

    let os = Arc::new(HostOs::new());
    let interrupts = Arc::new(HostInterrupts::new());
    let kernel = Kernel::init(
        KernelConfig::default(),
        modules,
        os.clone(),
        interrupts.clone(),
    )
    .expect("Failed to initialize kernel");
    kernel.create_thread(worker).expect("Failed to create worker thread");
    kernel.run().expect("Failed to start kernel");

    let mut group = c.benchmark_group("isr_round_trip");
    group.throughput(Throughput::Elements(1));
    for (name, target) in [("common_thread", local), ("worker_thread", worker)] {
        let id = Id::event(target.module_idx().unwrap(), 0);
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut event = Event::new(id, local, target).with_param_u32(0, 1);
                interrupts
                    .raise(1, || kernel.put_event(&mut event))
                    .unwrap()
                    .unwrap();
                black_box(rx.recv().unwrap())
            });
        });
    }
    group.finish();

    os.halt();
    os.join().expect("Failed to join kernel threads");
}

criterion_group!(
    benches,
    bench_event_record,
    bench_flag_register,
    bench_isr_round_trip
);
criterion_main!(benches);
