use glam::DVec3;

use super::*;
use crate::config::SimConfig;
use crate::mesh::Detector;

fn bank_config(detectors: Vec<Detector>) -> SimConfig {
  let mut cfg = SimConfig::default().with_detectors(detectors);
  cfg.save_det = true;
  cfg
}

fn one_detector() -> Vec<Detector> {
  vec![Detector {
    pos: DVec3::new(0.0, 0.0, 0.0),
    radius: 1.0,
  }]
}

#[test]
fn test_capture_inside_radius() {
  let cfg = bank_config(one_detector());
  let bank = DetectorBank::new(&cfg, 1);
  let mut stats = PartialStats::new(1);
  stats.scatters[0] = 3.0;
  stats.paths[0] = 12.5;

  let hit = bank.capture(DVec3::new(0.5, 0.0, 0.0), DVec3::Z, 1.0, [7, 9], &stats);
  assert!(hit);
  let miss = bank.capture(DVec3::new(2.0, 0.0, 0.0), DVec3::Z, 1.0, [7, 9], &stats);
  assert!(!miss);

  let out = bank.finish();
  assert_eq!(out.count(), 1);
  assert_eq!(out.total, 1);
  assert_eq!(out.dropped, 0);

  // Layout: id, scatters, pathlengths, initial weight.
  let rec = out.record(0);
  assert_eq!(rec.len(), 1 + 1 + 1 + 1);
  assert_eq!(rec[0], 1.0);
  assert_eq!(rec[1], 3.0);
  assert_eq!(rec[2], 12.5);
  assert_eq!(rec[3], 1.0);
}

#[test]
fn test_first_detector_wins() {
  // Overlapping spheres; the earlier entry takes the photon.
  let detectors = vec![
    Detector {
      pos: DVec3::new(0.0, 0.0, 0.0),
      radius: 1.0,
    },
    Detector {
      pos: DVec3::new(0.2, 0.0, 0.0),
      radius: 1.0,
    },
  ];
  let cfg = bank_config(detectors);
  let bank = DetectorBank::new(&cfg, 1);
  bank.capture(DVec3::new(0.3, 0.0, 0.0), DVec3::Z, 1.0, [0, 0], &PartialStats::new(1));
  let out = bank.finish();
  assert_eq!(out.record(0)[0], 1.0);
}

#[test]
fn test_momentum_and_exit_layout() {
  let mut cfg = bank_config(one_detector());
  cfg.save_momentum = true;
  cfg.save_exit = true;
  let bank = DetectorBank::new(&cfg, 2);

  let mut stats = PartialStats::new(2);
  stats.scatters[0] = 1.0;
  stats.scatters[1] = 2.0;
  stats.paths[0] = 3.0;
  stats.paths[1] = 4.0;
  stats.momentum[0] = 0.25;
  stats.momentum[1] = 0.5;

  let pos = DVec3::new(0.1, 0.2, 0.3);
  let dir = DVec3::new(0.0, 0.0, 1.0);
  bank.capture(pos, dir, 0.75, [0, 0], &stats);

  let out = bank.finish();
  // id + 2 scat + 2 path + 2 momentum + 6 exit + weight
  assert_eq!(out.reclen, 1 + 2 + 2 + 2 + 6 + 1);
  let rec = out.record(0);
  assert_eq!(&rec[1..3], &[1.0, 2.0]);
  assert_eq!(&rec[3..5], &[3.0, 4.0]);
  assert_eq!(&rec[5..7], &[0.25, 0.5]);
  assert_eq!(&rec[7..10], &[0.1, 0.2, 0.3]);
  assert_eq!(&rec[10..13], &[0.0, 0.0, 1.0]);
  assert_eq!(rec[13], 0.75);
}

#[test]
fn test_seed_buffer_parallel_to_records() {
  let mut cfg = bank_config(one_detector());
  cfg.save_seed = true;
  let bank = DetectorBank::new(&cfg, 1);
  let stats = PartialStats::new(1);
  bank.capture(DVec3::ZERO, DVec3::Z, 1.0, [11, 22], &stats);
  bank.capture(DVec3::ZERO, DVec3::Z, 1.0, [33, 44], &stats);

  let out = bank.finish();
  assert_eq!(out.count(), 2);
  assert_eq!(out.seeds, vec![[11, 22], [33, 44]]);
}

#[test]
fn test_overflow_drops_but_counts() {
  let mut cfg = bank_config(one_detector());
  cfg.max_detected = 2;
  let bank = DetectorBank::new(&cfg, 1);
  let stats = PartialStats::new(1);
  for _ in 0..5 {
    assert!(bank.capture(DVec3::ZERO, DVec3::Z, 1.0, [0, 0], &stats));
  }
  let out = bank.finish();
  assert_eq!(out.count(), 2);
  assert_eq!(out.total, 5);
  assert_eq!(out.dropped, 3);
}

#[test]
fn test_empty_detector_list_captures_nothing() {
  let cfg = bank_config(Vec::new());
  let bank = DetectorBank::new(&cfg, 1);
  let stats = PartialStats::new(1);
  assert!(!bank.capture(DVec3::ZERO, DVec3::Z, 1.0, [0, 0], &stats));
  let out = bank.finish();
  assert_eq!(out.count(), 0);
  assert_eq!(out.total, 0);
}

#[test]
fn test_partial_stats_reset() {
  let mut stats = PartialStats::new(3);
  stats.scatters[1] = 5.0;
  stats.paths[2] = 2.0;
  stats.momentum[0] = 1.0;
  stats.reset();
  assert!(stats.scatters.iter().all(|&x| x == 0.0));
  assert!(stats.paths.iter().all(|&x| x == 0.0));
  assert!(stats.momentum.iter().all(|&x| x == 0.0));
}
