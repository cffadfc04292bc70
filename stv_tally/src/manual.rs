/*!

This is the long-form manual for `stv_tally` and the `teller` program.

## Counting rules

The count is a single transferable vote with a Droop quota and fractional
surplus transfers. Ballots are grouped by identical ranking first (see
`aggregate`), then the count proceeds in rounds:

1. The quota is `floor(total / (seats + 1)) + 1` where `total` is the number
   of valid ballots.
2. Every ballot is credited to its highest ranked candidate who is neither
   elected nor eliminated, with its current weight. All ballots start with a
   weight of 1.
3. If the best candidates reach the quota, they are elected together. When
   seats are left to fill, each ballot that was credited to them keeps only the
   fraction `(votes - quota) / votes` of its weight for the next rounds.
4. Otherwise, all the candidates sharing the lowest total are eliminated
   together. Their ballots move to the next preference at full weight.

The count stops when all the seats are filled, or when it reaches a tie
that cannot be resolved:
- more candidates reach the quota with the same total than there are seats left;
- all the remaining candidates share the lowest total, so eliminating them would
  leave nobody.

In both cases, the tied candidates are reported in `TallyResult::tied_winners`
and the seats they compete for stay empty.

## Ballot rules

A ballot is a list of candidate indices, most preferred first. It is rejected if:
- it is empty
- it ranks more candidates than there are
- it ranks fewer candidates than the `minimum_preferences` of the election (when not 0)
- it refers to a candidate that does not exist
- it ranks a candidate twice

Rejected ballots are reported as errors when they are submitted, and skipped
silently (with a warning in the logs) when recounting a stored vote file.

## Vote files

Votes are stored one ballot per line, as the comma-separated indices of the
ranked candidates:

```text
0,2,1
1
2,0
```

There is no header. Blank lines are ignored.

## Election files

An election is described by a JSON file:

```json
{
  "election_name": "Board 2024",
  "minimum_preferences": 0,
  "winner_amount": 2,
  "candidate_names": ["Alice", "Bob", "Charlie"],
  "candidate_descriptions": ["", "", ""],
  "randomise_order": false,
  "election_id": 0
}
```

The `election_id` is assigned by the program when a poll is created, and may be
left out of the file given to `teller create`.

## Example

```text
teller count election.json votes.csv --out stdout
```

 */
