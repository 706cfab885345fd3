use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gridmna_components::{EmtInductor, EmtPiLine, Resistor, Switch};
use gridmna_core::{Domain, PhaseType, RhsAccumulator, SystemTopologyBuilder};

fn ladder_of_resistors(rungs: usize) {
    let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-4, PhaseType::Abc);
    for i in 0..=rungs {
        builder.add_node(format!("n{i}")).unwrap();
    }
    for i in 0..rungs {
        let r = Resistor::new(format!("r{i}"), 10.0, Domain::Emt).unwrap();
        builder
            .add_component(Box::new(r), vec![format!("n{i}"), format!("n{}", i + 1)])
            .unwrap();
    }
    let shunt = Resistor::new("rshunt", 1e6, Domain::Emt).unwrap();
    builder
        .add_component(Box::new(shunt), vec![format!("n{rungs}"), "GND".to_string()])
        .unwrap();

    let topo = builder.build().unwrap();
    let mut matrix = topo.assemble_matrix(1e-4);
    matrix.factorize();
    let mut rhs = RhsAccumulator::<f64>::new(topo.matrix_size());
    rhs.inject_current(Some(0), None, 1.0);
    black_box(matrix.solve(rhs.as_vector()).unwrap());
}

fn rl_with_switch() {
    let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-4, PhaseType::Abc);
    builder.add_node("src").unwrap();
    builder.add_node("mid").unwrap();
    let sw = Switch::<f64>::new("sw1", Domain::Emt, true);
    builder
        .add_component(Box::new(sw), vec!["src".to_string(), "mid".to_string()])
        .unwrap();
    let l = EmtInductor::new("l1", 1e-3).unwrap();
    builder
        .add_component(Box::new(l), vec!["mid".to_string(), "GND".to_string()])
        .unwrap();

    let topo = builder.build().unwrap();
    let mut matrix = topo.assemble_matrix(1e-4);
    matrix.factorize();
    let mut rhs = RhsAccumulator::<f64>::new(topo.matrix_size());
    rhs.inject_current(Some(0), None, 1.0);
    black_box(matrix.solve(rhs.as_vector()).unwrap());
}

fn pi_line_stamp() {
    let mut builder = SystemTopologyBuilder::<f64>::new(50.0, 1e-4, PhaseType::Abc);
    builder.add_node("a").unwrap();
    builder.add_node("b").unwrap();
    let line = EmtPiLine::new("line1", 5.0, 1e-2, 1e-7).unwrap();
    builder
        .add_component(Box::new(line), vec!["a".to_string(), "b".to_string()])
        .unwrap();
    let load = Resistor::new("load", 100.0, Domain::Emt).unwrap();
    builder
        .add_component(Box::new(load), vec!["b".to_string(), "GND".to_string()])
        .unwrap();

    let topo = builder.build().unwrap();
    let mut matrix = topo.assemble_matrix(1e-4);
    matrix.factorize();
    let mut rhs = RhsAccumulator::<f64>::new(topo.matrix_size());
    rhs.inject_current(Some(0), None, 1.0);
    black_box(matrix.solve(rhs.as_vector()).unwrap());
}

fn bench_devices(c: &mut Criterion) {
    c.bench_function("resistor_ladder_32", |b| b.iter(|| ladder_of_resistors(32)));
    c.bench_function("rl_with_switch", |b| b.iter(rl_with_switch));
    c.bench_function("pi_line_stamp", |b| b.iter(pi_line_stamp));
}

criterion_group!(benches, bench_devices);
criterion_main!(benches);
