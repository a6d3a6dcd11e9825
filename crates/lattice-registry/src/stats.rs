//! Round statistics — collection sink and the operator-facing table.

use lattice_core::wire::TrafficSummary;

/// Receives the complete set of per-node traffic summaries once every
/// registered peer has reported for the round.
pub trait SummarySink: Send + Sync {
    fn round_complete(&self, summaries: &[TrafficSummary]);
}

/// Prints the per-node traffic table plus a totals row to stdout.
///
/// In a correct round the sent and received packet counts match and so
/// do the payload sums; a mismatch means packets were lost in flight.
pub struct ConsoleStatistics;

impl SummarySink for ConsoleStatistics {
    fn round_complete(&self, summaries: &[TrafficSummary]) {
        println!("{}", render_table(summaries));
    }
}

pub fn render_table(summaries: &[TrafficSummary]) -> String {
    let mut rows: Vec<&TrafficSummary> = summaries.iter().collect();
    rows.sort_by_key(|s| s.node_id);

    let mut out = String::new();
    out.push_str(&format!(
        "{:<10} {:>12} {:>12} {:>12} {:>16} {:>16}\n",
        "Node", "Sent", "Received", "Relayed", "Sum Sent", "Sum Received"
    ));
    let (mut sent, mut received, mut relayed) = (0i64, 0i64, 0i64);
    let (mut sent_sum, mut received_sum) = (0i64, 0i64);
    for s in rows {
        out.push_str(&format!(
            "{:<10} {:>12} {:>12} {:>12} {:>16} {:>16}\n",
            format!("Node {}", s.node_id),
            s.sent,
            s.received,
            s.relayed,
            s.sent_sum,
            s.received_sum
        ));
        // i64 totals: a misbehaving peer can report a negative count,
        // which must show up as negative, not wrap
        sent += i64::from(s.sent);
        received += i64::from(s.received);
        relayed += i64::from(s.relayed);
        sent_sum += s.sent_sum;
        received_sum += s.received_sum;
    }
    out.push_str(&format!(
        "{:<10} {:>12} {:>12} {:>12} {:>16} {:>16}",
        "Sum", sent, received, relayed, sent_sum, received_sum
    ));
    out
}
