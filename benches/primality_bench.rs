use criterion::{Criterion, black_box, criterion_group, criterion_main};
use num_bigint::BigUint;
use primegen::primality::PrimalityTester;

fn primes_below(limit: u32) -> Vec<BigUint> {
    let mut primes: Vec<u32> = Vec::new();
    for n in 2..limit {
        if primes.iter().take_while(|p| *p * *p <= n).all(|p| n % p != 0) {
            primes.push(n);
        }
    }
    primes.into_iter().map(BigUint::from).collect()
}

fn bench_is_prime_small(c: &mut Criterion) {
    let tester = PrimalityTester::new(1);
    let known = primes_below(100);
    let candidate = BigUint::from(97u32);
    c.bench_function("is_prime_small", |b| {
        b.iter(|| tester.is_prime(black_box(&known), black_box(&candidate)))
    });
}

fn bench_is_prime_large_sequential(c: &mut Criterion) {
    let tester = PrimalityTester::new(1);
    let known = primes_below(2_000);
    // 1997 * 1999: the smallest factor sits at the end of the needed set.
    let candidate = BigUint::from(3_992_003u32);
    c.bench_function("is_prime_large_sequential", |b| {
        b.iter(|| tester.is_prime(black_box(&known), black_box(&candidate)))
    });
}

fn bench_is_prime_large_parallel(c: &mut Criterion) {
    let tester = PrimalityTester::new(4);
    let known = primes_below(2_000);
    let candidate = BigUint::from(3_992_003u32);
    c.bench_function("is_prime_large_parallel", |b| {
        b.iter(|| tester.is_prime(black_box(&known), black_box(&candidate)))
    });
}

criterion_group!(
    benches,
    bench_is_prime_small,
    bench_is_prime_large_sequential,
    bench_is_prime_large_parallel,
);
criterion_main!(benches);
