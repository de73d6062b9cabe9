use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use data_encoding::HEXLOWER;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn setup() {
    let results_dir_path = PathBuf::from_str("./target/results/").unwrap();
    let parallel_results_dir_path = PathBuf::from_str("./target/parallel-results/").unwrap();

    if !results_dir_path.exists() {
        fs::create_dir_all(&results_dir_path).unwrap_or_else(|_|
            panic!("Failed to create results directory: {:?}", results_dir_path)
        );
    }

    if !parallel_results_dir_path.exists() {
        fs::create_dir_all(&parallel_results_dir_path).unwrap_or_else(|_|
            panic!("Failed to create parallel results directory: {:?}", parallel_results_dir_path)
        );
    }
}

#[allow(dead_code)]
pub fn read_lines(path: &Path) -> Result<Vec<String>, anyhow::Error> {
    let reader = BufReader::new(File::open(path)?);
    let lines = reader.lines().map(|x| x.unwrap()).collect();
    Ok(lines)
}

#[allow(dead_code)]
pub fn write_lines(path: &Path, lines: &[String]) -> Result<(), anyhow::Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(())
}

#[allow(dead_code)]
pub fn temp_file_name(dir: &str) -> PathBuf {
    let mut result = PathBuf::from(dir);
    let name = HEXLOWER.encode(&rand::random::<[u8; 16]>());
    result.push(name);
    result
}

/// Create a new empty directory with a random name under `dir`.
#[allow(dead_code)]
pub fn temp_dir(dir: &str) -> PathBuf {
    let path = temp_file_name(dir);
    fs::create_dir_all(&path).unwrap_or_else(|_|
        panic!("Failed to create directory: {:?}", path)
    );
    path
}

#[allow(dead_code)]
pub fn dir_entries(dir: &Path) -> Result<Vec<PathBuf>, anyhow::Error> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

/// Records with few distinct ids, duplicate keys and a payload unique to each line.
#[allow(dead_code)]
pub fn random_records(count: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let id = format!("id-{}", rng.gen_range(0..50));
            let timestamp: i64 = rng.gen_range(-1_000..1_000);
            format!("{}\t{}\tpayload-{}\t{}", id, timestamp, i, rng.gen::<u32>())
        })
        .collect()
}

/// Stable in-memory sort by id bytes and numeric timestamp.
#[allow(dead_code)]
pub fn sorted_copy(lines: &[String]) -> Vec<String> {
    let mut sorted = lines.to_vec();
    sorted.sort_by_key(|line| {
        let mut fields = line.split('\t');
        let id = fields.next().unwrap().as_bytes().to_vec();
        let timestamp = i64::from_str(fields.next().unwrap()).unwrap();
        (id, timestamp)
    });
    sorted
}
