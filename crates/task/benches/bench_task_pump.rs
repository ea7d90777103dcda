use std::hint::black_box;
use std::time::{Duration, Instant};

use voxedit_task::{FromFn, Step, TaskRuntime, from_fn};

fn bench_single_task(steps: u64, budget: Duration) {
    let mut rt = TaskRuntime::new();
    let mut remaining = steps;
    rt.start(from_fn(move |acc: &mut u64| -> Result<Step<()>, ()> {
        if remaining == 0 {
            return Ok(Step::Done(()));
        }
        remaining -= 1;
        *acc = black_box(acc.wrapping_add(remaining));
        Ok(Step::Continue)
    }));

    let mut acc = 0u64;
    let mut ticks = 0u32;
    let start = Instant::now();
    while !rt.is_empty() {
        rt.pump(&mut acc, budget);
        ticks += 1;
    }
    let elapsed = start.elapsed();
    println!(
        "  single task ({steps} steps, budget {budget:?}): {ticks} ticks, avg pump {:?}, total {elapsed:?}",
        rt.timer().average()
    );
}

type BoxedStep = Box<dyn FnMut(&mut u64) -> Result<Step<()>, ()>>;

fn bench_many_tasks(tasks: usize, steps: u64, budget: Duration) {
    let mut rt: TaskRuntime<FromFn<BoxedStep, (), ()>> = TaskRuntime::new();
    for _ in 0..tasks {
        let mut remaining = steps;
        let body: BoxedStep = Box::new(move |acc: &mut u64| {
            if remaining == 0 {
                return Ok(Step::Done(()));
            }
            remaining -= 1;
            *acc = black_box(acc.wrapping_mul(31).wrapping_add(remaining));
            Ok(Step::Continue)
        });
        rt.start(from_fn(body));
    }

    let mut acc = 0u64;
    let mut ticks = 0u32;
    let start = Instant::now();
    while !rt.is_empty() {
        rt.pump(&mut acc, budget);
        ticks += 1;
    }
    let elapsed = start.elapsed();
    println!(
        "  {tasks} tasks x {steps} steps (budget {budget:?}): {ticks} ticks, max pump {:?}, total {elapsed:?}",
        rt.timer().max()
    );
}

fn main() {
    println!("=== Task Pump Benchmarks ===\n");

    println!("Single task:");
    bench_single_task(10_000, Duration::ZERO);
    bench_single_task(1_000_000, Duration::from_millis(1));
    bench_single_task(1_000_000, Duration::from_millis(32));

    println!("\nMany tasks:");
    bench_many_tasks(10, 100_000, Duration::from_millis(4));
    bench_many_tasks(100, 10_000, Duration::from_millis(4));

    println!("\n=== Done ===");
}
